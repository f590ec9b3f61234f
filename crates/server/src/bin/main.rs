use fathom_server::FathomServer;

#[derive(clap::Parser)]
struct Args {
    #[arg(long, env = "FATHOM_CONFIG", default_value = "config/fathom.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = <Args as clap::Parser>::parse();

    FathomServer::new().with_app_config(&args.config).run().await
}
