use clap::Parser;
use imvec::Opts;
use imvec::cli::SubCommandExtend;
use imvec::config::SubCommand;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();

    match &opts.subcmd {
        SubCommand::CreateDb(cmd) => cmd.run(&opts).await,
        SubCommand::SearchDb(cmd) => cmd.run(&opts).await,
    }
}
