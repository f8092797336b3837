mod push;
mod server;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "booth-server",
    about = "Photo booth kiosk controller"
)]
struct Cli {
    #[command(flatten)]
    server: server::ServerArgs,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    server::run(cli.server).await;
}
