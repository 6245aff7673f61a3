//! Built-in backend that reads the VMCOREINFO note embedded in a dump.
//!
//! The kernel exports a small `KEY=VALUE` text block (`OSRELEASE=`,
//! `PAGESIZE=`, `SYMBOL(name)=`, `NUMBER(name)=`, ...) into every crash dump.
//! This backend locates that block and answers the reads it can satisfy
//! from it. Everything that needs type information is `Unsupported`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use super::{ReadError, Session, SessionError, UtsName};

const ELF_MAGIC: &[u8] = b"\x7fELF";
const KDUMP_MAGIC: &[u8] = b"KDUMP   ";
const DISKDUMP_MAGIC: &[u8] = b"DISKDUMP";

const NOTE_ANCHOR: &[u8] = b"OSRELEASE=";
const CHUNK_SIZE: usize = 1 << 20;
const SCAN_LIMIT: u64 = 256 << 20;
/// Upper bound on the note text; the kernel reserves one page for it.
const NOTE_MAX: usize = 1 << 14;

/// Snapshot format recognized from the leading magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    Elf,
    KdumpCompressed,
    Diskdump,
}

impl DumpFormat {
    fn detect(header: &[u8]) -> Option<Self> {
        if header.starts_with(ELF_MAGIC) {
            Some(DumpFormat::Elf)
        } else if header.starts_with(KDUMP_MAGIC) {
            Some(DumpFormat::KdumpCompressed)
        } else if header.starts_with(DISKDUMP_MAGIC) {
            Some(DumpFormat::Diskdump)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DumpFormat::Elf => "elf",
            DumpFormat::KdumpCompressed => "kdump-compressed",
            DumpFormat::Diskdump => "diskdump",
        }
    }
}

/// Session backed by the VMCOREINFO note.
#[derive(Debug)]
pub struct VmcoreInfoSession {
    path: PathBuf,
    format: DumpFormat,
    entries: BTreeMap<String, String>,
    debug_files: Vec<PathBuf>,
}

impl VmcoreInfoSession {
    pub fn open(path: &Path, debug_files: Vec<PathBuf>) -> Result<Self, SessionError> {
        if !path.exists() {
            return Err(SessionError::SnapshotNotFound(path.to_path_buf()));
        }
        let mut file = File::open(path)?;
        let mut header = [0u8; 8];
        let n = read_full(&mut file, &mut header)?;
        let format = DumpFormat::detect(&header[..n])
            .ok_or_else(|| SessionError::UnrecognizedFormat(path.to_path_buf()))?;

        let entries = match scan_note(file.take(SCAN_LIMIT))? {
            Some(text) => parse_entries(&text),
            None => {
                tracing::warn!(path = %path.display(), "No VMCOREINFO note found in snapshot");
                BTreeMap::new()
            }
        };

        tracing::info!(
            path = %path.display(),
            format = format.as_str(),
            entries = entries.len(),
            debug_files = debug_files.len(),
            "Opened snapshot"
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            entries,
            debug_files,
        })
    }

    /// Build a session directly from note text.
    pub fn from_note(path: impl Into<PathBuf>, format: DumpFormat, note: &str) -> Self {
        Self {
            path: path.into(),
            format,
            entries: parse_entries(note),
            debug_files: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> DumpFormat {
        self.format
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    fn entry(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl Session for VmcoreInfoSession {
    fn backend_name(&self) -> &str {
        super::DEFAULT_BACKEND
    }

    fn debug_files(&self) -> &[PathBuf] {
        &self.debug_files
    }

    /// `NUMBER(name)`, then `LENGTH(name)`, then a plain key. Addresses
    /// from `SYMBOL(name)` are only served by `symbol_address`.
    fn symbol_u64(&self, name: &str) -> Result<u64, ReadError> {
        let raw = self
            .entry(&format!("NUMBER({name})"))
            .or_else(|| self.entry(&format!("LENGTH({name})")))
            .or_else(|| self.entry(name))
            .ok_or_else(|| ReadError::SymbolNotFound(name.to_string()))?;
        raw.trim().parse::<u64>().map_err(|e| ReadError::InvalidValue {
            symbol: name.to_string(),
            reason: e.to_string(),
        })
    }

    fn symbol_string(&self, name: &str) -> Result<String, ReadError> {
        ["{}", "NUMBER({})", "LENGTH({})", "SYMBOL({})"]
            .iter()
            .find_map(|pattern| self.entry(&pattern.replace("{}", name)))
            .map(str::to_string)
            .ok_or_else(|| ReadError::SymbolNotFound(name.to_string()))
    }

    fn symbol_address(&self, name: &str) -> Result<u64, ReadError> {
        let raw = self
            .entry(&format!("SYMBOL({name})"))
            .ok_or_else(|| ReadError::SymbolNotFound(name.to_string()))?;
        u64::from_str_radix(raw.trim().trim_start_matches("0x"), 16).map_err(|e| {
            ReadError::InvalidValue {
                symbol: name.to_string(),
                reason: e.to_string(),
            }
        })
    }

    fn utsname(&self) -> Result<UtsName, ReadError> {
        let release = self
            .entry("OSRELEASE")
            .ok_or_else(|| ReadError::SymbolNotFound("OSRELEASE".to_string()))?;
        Ok(UtsName {
            sysname: "Linux".to_string(),
            release: release.to_string(),
            ..UtsName::default()
        })
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Stream the reader looking for the note text.
fn scan_note(mut reader: impl Read) -> io::Result<Option<String>> {
    let mut window: Vec<u8> = Vec::with_capacity(CHUNK_SIZE + NOTE_MAX);
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let n = read_full(&mut reader, &mut chunk)?;
        window.extend_from_slice(&chunk[..n]);

        if let Some(start) = find(&window, NOTE_ANCHOR) {
            // Make sure the whole note is buffered before cutting it out.
            while window.len() - start < NOTE_MAX {
                let more = read_full(&mut reader, &mut chunk)?;
                if more == 0 {
                    break;
                }
                window.extend_from_slice(&chunk[..more]);
            }
            let tail = &window[start..window.len().min(start + NOTE_MAX)];
            let end = tail
                .iter()
                .position(|b| *b == 0 || !(b.is_ascii_graphic() || b.is_ascii_whitespace()))
                .unwrap_or(tail.len());
            return Ok(Some(String::from_utf8_lossy(&tail[..end]).into_owned()));
        }

        if n == 0 {
            return Ok(None);
        }
        // Keep enough overlap for an anchor split across chunks.
        let keep = NOTE_ANCHOR.len();
        if window.len() > keep {
            window.drain(..window.len() - keep);
        }
    }
}

fn parse_entries(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}
