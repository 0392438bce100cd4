use std::fs::create_dir_all;

use clap::Parser;
use eyre::{bail, Result as EyreResult, WrapErr};
use rstream_config::ConfigFile;
use tracing::{info, warn};

use crate::cli::RootArgs;

/// Write a default configuration
#[derive(Debug, Parser)]
pub struct InitCommand {
    /// Overwrite an existing config.toml
    #[arg(short, long)]
    pub force: bool,
}

impl InitCommand {
    pub fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let path = root_args.home;

        create_dir_all(&path)
            .wrap_err_with(|| format!("failed to create directory {path:?}"))?;

        if ConfigFile::exists(&path) {
            if !self.force {
                bail!("Configuration already exists in {path:?}");
            }

            warn!(%path, "Overriding existing config.toml");
        }

        ConfigFile::default().save(&path)?;

        info!(%path, "Initialized configuration");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use tempdir::TempDir;

    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite_without_force() {
        let dir = TempDir::new("rstream-init").unwrap();
        let home = Utf8PathBuf::from_path_buf(dir.path().join("home")).unwrap();

        InitCommand { force: false }
            .run(RootArgs { home: home.clone() })
            .unwrap();
        assert!(ConfigFile::exists(&home));

        assert!(InitCommand { force: false }
            .run(RootArgs { home: home.clone() })
            .is_err());

        InitCommand { force: true }
            .run(RootArgs { home })
            .unwrap();
    }
}
