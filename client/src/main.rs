use clap::Parser;

use tokio::io;
use tokio::select;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_stream::StreamExt; // provides combinator methods like next on to of FramedRead buf read and Stream trait

use tracing_subscriber::fmt;
use tracing::{info, error, Level};

use relay_protocol::{Request, Response};

use client::ChatClient;
use client::input_handler::{parse_line, Command, InputError, GREETINGS};

const SERVER: &str = "127.0.0.1:4321";
const LINES_MAX_LEN: usize = 256;

/// Interactive client for the relay server
#[derive(Debug, Parser)]
#[command(name = "relay-client", version, about)]
struct Args {
    /// Server address
    #[arg(long, default_value = SERVER)]
    server: String,

    /// Name to register under
    #[arg(long)]
    name: String,

    #[arg(long, default_value = "warn")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();

    fmt()
        .compact() // use abbreviated log format
        .with_max_level(args.log_level)
        .with_thread_ids(true) // display thread id where event happens
        .init(); // set as default subscriber

    info!("Client starting, connecting to server {:?}", &args.server);

    let mut client = ChatClient::connect(&args.server).await?;
    client.register(&args.name).await?;

    println!("{}", GREETINGS);
    println!(">>> Registered as name: {}", &args.name);

    let (mut reader, mut writer) = client.into_split();
    let mut stdin = FramedRead::new(io::stdin(), LinesCodec::new_with_max_length(LINES_MAX_LEN));

    loop {
        select! {
            response = reader.next_response() => {
                match response? {
                    Some(Response::PrivateMessage{sender, message}) => {
                        println!("{}: {}", sender, String::from_utf8_lossy(&message));
                    },
                    Some(Response::Users(names)) => {
                        println!("Users currently online: {}", names.join(" "));
                    },
                    None => {
                        println!(">>> Server has closed the connection");
                        break;
                    },
                }
            }
            line = stdin.next() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        error!("Unable to read input: {}", e);
                        continue;
                    },
                    None => {
                        writer.send(Request::Quit).await?;
                        break;
                    },
                };

                match parse_line(&line) {
                    Ok(Command::Private{recipient, text}) => {
                        writer.send_private(&args.name, &recipient, text).await?;
                    },
                    Ok(Command::Users) => writer.send(Request::Users).await?,
                    Ok(Command::Quit) => {
                        writer.send(Request::Quit).await?;
                        break;
                    },
                    Err(InputError::Empty) => continue,
                    Err(e) => println!("$ {}", e),
                }
            }
        }
    }

    Ok(())
}
