//! Engine tuning knobs and their TOML loader.
//!
//! Callers hand an [`EngineConfig`] to `execute`; the loader exists for
//! hosts that keep the knobs in a `magnetite.toml` under an `[engine]`
//! table. A missing or unparsable file falls back to defaults rather than
//! failing startup. Out-of-range values are clamped and the clamp is
//! logged under `target: "config"`.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Smallest block a probe worker steals.
    pub work_block_min: usize,
    /// Steal-block sizing target: aim for this many blocks per thread.
    pub blocks_per_thread: usize,
    /// Build side below this row count builds single-threaded.
    pub build_parallel_min_rows: usize,
    /// Probe side below this row count probes single-threaded.
    pub probe_parallel_min_rows: usize,
    /// Size of the blocks the global arena hands to thread arenas.
    pub global_block_bytes: usize,
    /// Desired mean entries per hash-directory slot.
    pub target_bucket_load: usize,
    /// Worker count override; `None` means hardware concurrency.
    pub threads: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_block_min: 256,
            blocks_per_thread: 16,
            build_parallel_min_rows: 2048,
            probe_parallel_min_rows: 1 << 18,
            global_block_bytes: 4 << 20,
            target_bucket_load: 8,
            threads: None,
        }
    }
}

/// Minimum accepted global block size.
const MIN_GLOBAL_BLOCK_BYTES: usize = 1 << 20;

#[derive(Debug, Default, Clone, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    engine: EngineConfig,
}

impl EngineConfig {
    /// Worker thread count: the override if set, else hardware
    /// concurrency, else 4.
    pub fn effective_threads(&self) -> usize {
        match self.threads {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }

    /// Clamp out-of-range knobs in place, logging each adjustment.
    pub fn sanitize(&mut self) {
        if self.global_block_bytes < MIN_GLOBAL_BLOCK_BYTES {
            info!(
                target: "config",
                raw = self.global_block_bytes,
                clamped = MIN_GLOBAL_BLOCK_BYTES,
                "global_block_bytes_clamped"
            );
            self.global_block_bytes = MIN_GLOBAL_BLOCK_BYTES;
        }
        if self.target_bucket_load == 0 {
            info!(target: "config", "target_bucket_load_clamped");
            self.target_bucket_load = 1;
        }
        if self.work_block_min == 0 {
            info!(target: "config", "work_block_min_clamped");
            self.work_block_min = 1;
        }
        if self.blocks_per_thread == 0 {
            info!(target: "config", "blocks_per_thread_clamped");
            self.blocks_per_thread = 1;
        }
    }
}

/// Load the engine table from a TOML file, defaulting when absent.
pub fn load_from(path: Option<PathBuf>) -> Result<EngineConfig> {
    let path = path.unwrap_or_else(|| PathBuf::from("magnetite.toml"));
    let mut config = if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => file.engine,
            Err(err) => {
                warn!(target: "config", path = %path.display(), %err, "config_parse_failed");
                EngineConfig::default()
            }
        }
    } else {
        EngineConfig::default()
    };
    config.sanitize();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__no_such_config__.toml"))).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn parses_engine_table() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            "[engine]\nwork_block_min = 512\nthreads = 2\ntarget_bucket_load = 4\n",
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.work_block_min, 512);
        assert_eq!(cfg.threads, Some(2));
        assert_eq!(cfg.target_bucket_load, 4);
        // Unspecified knobs keep their defaults.
        assert_eq!(cfg.blocks_per_thread, 16);
    }

    #[test]
    fn clamps_tiny_global_blocks() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[engine]\nglobal_block_bytes = 4096\n").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.global_block_bytes, MIN_GLOBAL_BLOCK_BYTES);
    }

    #[test]
    fn parse_error_falls_back_to_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "[engine\nthis is not toml").unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn clamp_logging_uses_config_target() {
        use std::io::Write;
        use std::sync::{Arc, Mutex, MutexGuard};
        use tracing::subscriber::with_default;
        use tracing_subscriber::fmt::MakeWriter;

        #[derive(Clone)]
        struct BufferWriter {
            inner: Arc<Mutex<Vec<u8>>>,
        }

        struct LockedWriter<'a> {
            guard: MutexGuard<'a, Vec<u8>>,
        }

        impl Write for LockedWriter<'_> {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.guard.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        impl<'a> MakeWriter<'a> for BufferWriter {
            type Writer = LockedWriter<'a>;
            fn make_writer(&'a self) -> Self::Writer {
                LockedWriter {
                    guard: self.inner.lock().expect("log buffer poisoned"),
                }
            }
        }

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer = BufferWriter {
            inner: buffer.clone(),
        };
        let subscriber = tracing_subscriber::fmt()
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .with_writer(writer)
            .finish();

        let mut cfg = EngineConfig {
            global_block_bytes: 1,
            ..EngineConfig::default()
        };
        with_default(subscriber, || cfg.sanitize());

        let log_output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(log_output.contains("config:"));
        assert!(log_output.contains("global_block_bytes_clamped"));
        assert_eq!(cfg.global_block_bytes, MIN_GLOBAL_BLOCK_BYTES);
    }

    #[test]
    fn threads_override_wins() {
        let mut cfg = EngineConfig::default();
        cfg.threads = Some(3);
        assert_eq!(cfg.effective_threads(), 3);
        cfg.threads = Some(0);
        assert!(cfg.effective_threads() >= 1);
    }
}
