use clap::Parser;

use askpipe::config::Args;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    askpipe::init_tracing(&args.log_filter());

    if let Err(e) = askpipe::run(args).await {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
