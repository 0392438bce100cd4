use std::io;
use std::sync::Arc;

use bytes::Bytes;
use camino::Utf8PathBuf;
use clap::Parser;
use eyre::{Result as EyreResult, WrapErr};
use rstream_config::ConfigFile;
use rstream_primitives::messages::SourceRef;
use rstream_relay::loopback::LoopbackPeer;
use rstream_relay::{DataReference, SessionRegistry, StreamError};
use tokio::fs::{read, File};
use tokio::io::{copy, stdout, AsyncWrite, AsyncWriteExt};
use tokio::signal::ctrl_c;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::RootArgs;
use crate::defaults::DEFAULT_CHUNK_SIZE;

/// Stream a local file through the relay via an in-process peer
#[derive(Debug, Parser)]
pub struct RelayCommand {
    /// File served by the loopback peer
    #[arg(long, value_name = "PATH")]
    pub input: Utf8PathBuf,

    /// Destination for the reassembled stream, stdout when omitted
    #[arg(long, value_name = "PATH")]
    pub output: Option<Utf8PathBuf>,

    /// Bytes per chunk pushed by the peer
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Largest stream accepted, the configured default when omitted
    #[arg(long, value_name = "BYTES")]
    pub max_length: Option<u64>,
}

impl RelayCommand {
    pub async fn run(self, root_args: RootArgs) -> EyreResult<()> {
        let config = if ConfigFile::exists(&root_args.home) {
            ConfigFile::load(&root_args.home)?
        } else {
            debug!(home=%root_args.home, "No configuration found, using defaults");
            ConfigFile::default()
        };

        let data = read(&self.input)
            .await
            .wrap_err_with(|| format!("failed to read {:?}", self.input))?;

        let registry = SessionRegistry::new(config.relay);
        let peer = Arc::new(LoopbackPeer::new(registry.clone(), self.chunk_size));
        let source = SourceRef::new(self.input.as_str());

        let _ = peer.serve(source.clone(), Bytes::from(data));

        let cancel = CancellationToken::new();
        drop(tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            }
        }));

        let reference = DataReference::new(registry, peer, source);
        let mut stream = reference.open_read_stream(self.max_length, cancel)?;
        let stream_id = stream.id();

        let mut writer: Box<dyn AsyncWrite + Send + Unpin> = match &self.output {
            Some(path) => Box::new(
                File::create(path)
                    .await
                    .wrap_err_with(|| format!("failed to create {path:?}"))?,
            ),
            None => Box::new(stdout()),
        };

        let copied = copy(&mut stream, &mut writer).await.map_err(unwrap_stream_error)?;

        writer.flush().await?;

        info!(%stream_id, input=%self.input, copied, "Relayed stream");

        Ok(())
    }
}

fn unwrap_stream_error(err: io::Error) -> eyre::Report {
    match err.get_ref().and_then(|inner| inner.downcast_ref::<StreamError>()) {
        Some(stream_err) => eyre::Report::new(stream_err.clone()).wrap_err("remote stream failed"),
        None => eyre::Report::new(err).wrap_err("failed to copy remote stream"),
    }
}
