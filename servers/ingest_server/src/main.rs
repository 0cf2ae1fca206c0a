use clap::Parser;
use inlet_rtmp::listener::RtmpListener;
use inlet_rtmp::session::SessionConfig;
use std::path::PathBuf;

mod relay;

/// RTMP ingest server: accepts publishing encoders on the configured port
/// and drains each published stream through a forwarding thread.
#[derive(Parser, Debug)]
struct Args {
    /// Port to listen for RTMP publishers on.
    #[arg(long, default_value_t = 1935)]
    port: u16,

    /// Directory the per-stream media dumps are written to.
    #[arg(long, default_value = "streams")]
    output_dir: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    std::fs::create_dir_all(&args.output_dir)?;

    let listener = RtmpListener::bind(("0.0.0.0", args.port))?;
    log::info!("listening for RTMP publishers on port {}", args.port);

    let output_dir = args.output_dir;
    listener.run(SessionConfig::default(), move || {
        relay::RelayActor::new(output_dir.clone())
    })?;

    Ok(())
}
