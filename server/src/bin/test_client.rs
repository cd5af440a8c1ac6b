//! Headless protocol peer for exercising a running server by hand.
//!
//! Connects over plaintext (use `--no-tls` or `--allow-plain` on the server),
//! joins, steers in a slow circle while printing snapshot summaries, sends one
//! chat message and leaves.

use clap::Parser;
use shared::protocol::{decode_server_line, encode_line, ClientMessage, ServerMessage};
use shared::DEFAULT_PORT;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{sleep, Duration};

#[derive(Parser, Debug)]
#[command(name = "test_client", about = "Headless snake arena client")]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, default_value = "tester")]
    name: String,

    #[arg(long, default_value = "#00c853")]
    color: String,

    /// How many seconds to stay connected
    #[arg(long, default_value_t = 15)]
    duration: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect((args.host.as_str(), args.port)).await?;
    println!("Connected to {}:{}", args.host, args.port);
    let (read_half, mut write_half) = stream.into_split();

    let join = encode_line(&ClientMessage::Join {
        name: args.name.clone(),
        color: args.color.clone(),
    })?;
    write_half.write_all(join.as_bytes()).await?;

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match decode_server_line(&line) {
                Ok(ServerMessage::JoinAck { player_id }) => {
                    println!("Joined as player {}", player_id);
                }
                Ok(ServerMessage::JoinReject { reason }) => {
                    println!("Join rejected: {}", reason);
                    return;
                }
                Ok(ServerMessage::StateUpdate { tick, snakes, food, .. }) => {
                    println!(
                        "Tick {}: {} snakes, {} food",
                        tick,
                        snakes.len(),
                        food.len()
                    );
                }
                Ok(ServerMessage::ChatRelay { name, text, .. }) => {
                    println!("[chat] {}: {}", name, text);
                }
                Ok(ServerMessage::PlayerLeft { player_id }) => {
                    println!("Player {} left", player_id);
                }
                Err(e) => println!("Bad frame from server: {}", e),
            }
        }
    });

    // Steer in a circle at roughly 10 Hz.
    let steps = args.duration * 10;
    for i in 0..steps {
        let angle = i as f32 * 0.05;
        let input = encode_line(&ClientMessage::Input {
            dx: angle.cos(),
            dy: angle.sin(),
        })?;
        write_half.write_all(input.as_bytes()).await?;

        if i == steps / 2 {
            let chat = encode_line(&ClientMessage::Chat {
                text: "hello from the test client".to_string(),
            })?;
            write_half.write_all(chat.as_bytes()).await?;
        }

        sleep(Duration::from_millis(100)).await;
    }

    let leave = encode_line(&ClientMessage::Leave)?;
    write_half.write_all(leave.as_bytes()).await?;
    write_half.shutdown().await?;

    let _ = reader.await;
    println!("Done");
    Ok(())
}
