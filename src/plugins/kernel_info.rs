//! Kernel basics: utsname, banner, and taint flags.

use serde::Serialize;

use super::{Plugin, PluginContext, PluginError, PluginMeta};
use crate::session::{Session, UtsName};

#[derive(Debug, Default)]
pub struct KernelInfo;

#[derive(Debug, Serialize)]
struct Combined<'a> {
    uts: Option<&'a UtsName>,
    banner: Option<&'a str>,
    taints: Option<&'a [String]>,
}

fn read_uts(session: &dyn Session) -> Option<UtsName> {
    session
        .utsname()
        .map_err(|e| tracing::debug!(plugin = "kernel_info", error = %e, "init_uts_ns unavailable"))
        .ok()
}

fn read_banner(session: &dyn Session) -> Option<String> {
    session
        .symbol_string("linux_banner")
        .map(|b| b.trim().to_string())
        .map_err(|e| tracing::debug!(plugin = "kernel_info", error = %e, "linux_banner unavailable"))
        .ok()
        .filter(|b| !b.is_empty())
}

fn read_taints(session: &dyn Session) -> Option<Vec<String>> {
    session
        .taint_flags()
        .map_err(|e| tracing::debug!(plugin = "kernel_info", error = %e, "Kernel taints unavailable"))
        .ok()
}

impl Plugin for KernelInfo {
    fn collect(&mut self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        let session = ctx.session();
        let uts = read_uts(session);
        let banner = read_banner(session);
        let taints = read_taints(session);

        if let Some(uts) = &uts {
            ctx.write_json("uts.json", uts)?;
            ctx.write_lines(
                "uts.txt",
                [
                    format!("sysname:    {}", uts.sysname),
                    format!("nodename:   {}", uts.nodename),
                    format!("release:    {}", uts.release),
                    format!("version:    {}", uts.version),
                    format!("machine:    {}", uts.machine),
                    format!("domainname: {}", uts.domainname),
                ],
            )?;
        }

        if let Some(banner) = &banner {
            ctx.write_text("banner.txt", &format!("{banner}\n"))?;
        }

        if let Some(taints) = &taints {
            ctx.write_json("taints.json", taints)?;
        }

        ctx.write_json(
            "kernel_info.json",
            &Combined {
                uts: uts.as_ref(),
                banner: banner.as_deref(),
                taints: taints.as_deref(),
            },
        )
    }
}

impl PluginMeta for KernelInfo {
    const DESCRIPTION: &'static str = "Kernel basics (utsname, banner, taints)";
}
