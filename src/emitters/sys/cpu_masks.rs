//! `sys/devices/system/cpu/{online,present,possible}`.
//!
//! Each mask falls back to the next narrower one (possible to present,
//! present to online), then to an approximate `0-(nr_cpu_ids-1)` range.

use anyhow::bail;

use crate::emitters::registry::{ModuleRegistrar, RegistryError};
use crate::session::Session;

pub(super) fn register(r: &mut ModuleRegistrar) -> Result<(), RegistryError> {
    r.emits("sys/devices/system/cpu/online", emit_cpu_online)?;
    r.emits("sys/devices/system/cpu/present", emit_cpu_present)?;
    r.emits("sys/devices/system/cpu/possible", emit_cpu_possible)?;
    Ok(())
}

/// Render CPUs in sysfs list form, e.g. `0-3,8-11`.
pub fn format_cpu_list(cpus: &[u32]) -> String {
    let mut sorted = cpus.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut ranges = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(mut start) = iter.next() else {
        return String::new();
    };
    let mut prev = start;
    for cpu in iter {
        if cpu == prev + 1 {
            prev = cpu;
            continue;
        }
        ranges.push(range(start, prev));
        start = cpu;
        prev = cpu;
    }
    ranges.push(range(start, prev));
    ranges.join(",")
}

fn range(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}

fn mask(session: &dyn Session, symbol: &str) -> Option<Vec<u32>> {
    session.cpumask(symbol).ok().filter(|cpus| !cpus.is_empty())
}

fn render(session: &dyn Session, symbols: &[&str]) -> anyhow::Result<String> {
    for symbol in symbols {
        if let Some(cpus) = mask(session, symbol) {
            return Ok(format!("{}\n", format_cpu_list(&cpus)));
        }
    }
    let primary = symbols[0];
    match session.symbol_u64("nr_cpu_ids") {
        Ok(n) if n > 1 => Ok(format!(
            "# vmcore-report: approximate ({primary} missing)\n0-{}\n",
            n - 1
        )),
        Ok(1) => Ok(format!("# vmcore-report: approximate ({primary} missing)\n0\n")),
        _ => bail!("{primary} unavailable"),
    }
}

fn emit_cpu_online(session: &dyn Session) -> anyhow::Result<String> {
    render(session, &["cpu_online_mask"])
}

fn emit_cpu_present(session: &dyn Session) -> anyhow::Result<String> {
    render(session, &["cpu_present_mask", "cpu_online_mask"])
}

fn emit_cpu_possible(session: &dyn Session) -> anyhow::Result<String> {
    render(session, &["cpu_possible_mask", "cpu_present_mask"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::MockSession;

    #[test]
    fn formats_ranges() {
        assert_eq!(format_cpu_list(&[0, 1, 2, 3, 8, 9, 10, 11]), "0-3,8-11");
        assert_eq!(format_cpu_list(&[5, 0, 2, 1]), "0-2,5");
        assert_eq!(format_cpu_list(&[7]), "7");
        assert_eq!(format_cpu_list(&[]), "");
    }

    #[test]
    fn present_falls_back_to_online() {
        let session = MockSession::new().with_cpumask("cpu_online_mask", vec![0, 1]);
        assert_eq!(emit_cpu_present(&session).unwrap(), "0-1\n");
    }

    #[test]
    fn approximate_from_nr_cpu_ids() {
        let session = MockSession::new().with_u64("nr_cpu_ids", 4);
        assert_eq!(
            emit_cpu_possible(&session).unwrap(),
            "# vmcore-report: approximate (cpu_possible_mask missing)\n0-3\n"
        );
        let session = MockSession::new().with_u64("nr_cpu_ids", 1);
        assert!(emit_cpu_online(&session).unwrap().ends_with("\n0\n"));
    }

    #[test]
    fn nothing_known_is_an_error() {
        assert!(emit_cpu_online(&MockSession::new()).is_err());
    }
}
