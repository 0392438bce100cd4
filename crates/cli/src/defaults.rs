use camino::{Utf8Path, Utf8PathBuf};
use dirs::home_dir;

pub const DEFAULT_RSTREAM_HOME: &str = ".rstream";

/// Bytes the loopback peer pushes per `supplyData` call.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1_024;

pub fn default_home() -> Utf8PathBuf {
    if let Some(home) = home_dir() {
        if let Some(home) = Utf8Path::from_path(&home) {
            return home.join(DEFAULT_RSTREAM_HOME);
        }
    }

    Utf8PathBuf::from(DEFAULT_RSTREAM_HOME)
}
