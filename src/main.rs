use clap::{Parser, Subcommand};

use lanchat::{ChatManager, Endpoint, Role};
use lanchat::terminal;

#[derive(Parser)]
#[command(name = "lanchat", version, about = "Minimal two-party line-oriented chat over TCP")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Listen on a port and wait for a single peer to dial in.
    Serve {
        /// Port to bind on all interfaces.
        #[arg(short, long, default_value_t = 9000)]
        port: u16,
    },
    /// Dial out to a listening peer.
    Connect {
        /// Address of the listening side.
        #[arg(default_value = "127.0.0.1")]
        host: String,
        /// Port the listening side is bound to.
        #[arg(short, long, default_value_t = 9000)]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let (role, endpoint) = match cli.command {
        Command::Serve { port } => (Role::Server, Endpoint::new("0.0.0.0", port)),
        Command::Connect { host, port } => (Role::Client, Endpoint::new(host, port)),
    };
    let endpoint = match endpoint {
        Ok(endpoint) => endpoint,
        Err(err) => {
            eprintln!("** {err}");
            std::process::exit(1);
        }
    };

    let (manager, events) = ChatManager::new();
    let printer = tokio::spawn(terminal::event_printer(events));

    if let Err(err) = manager.start(role, endpoint).await {
        eprintln!("** {err}");
        std::process::exit(1);
    }

    // Chat until the user leaves, the peer does, or the process is told
    // to shut down. Every exit path runs the same stop().
    tokio::select! {
        _ = terminal::input_loop(&manager) => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    manager.stop().await;
    drop(manager);
    let _ = printer.await;
}
