//! Thin REPL glue for the two interactive binaries: the server's operator
//! console and the control client's station-switching prompt. Kept outside
//! the core per the ambient-stack split in SPEC_FULL.md §1/§10.

use std::io::Write as _;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::codec::{Command, Reply};
use crate::config::CONTROL_BUFFER;
use crate::error::{RadioError, Result};
use crate::server::Server;

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_server_help(extended: bool) {
    println!("Server Commands:");
    println!("print/p --> prints a list of the stations and all the clients listening to each station");
    println!("help/h --> prints the help menu");
    if extended {
        println!("addStation/a [songs...] --> adds a new station to server with [songs...] as music");
        println!("removeStation/r [stationNumber] --> removes station [stationNumber] from radio");
    }
}

/// Operator console for the server binary. Reads commands from stdin until
/// `quit`/`q`, then tears the server down.
pub async fn run_server_console(server: Arc<Server>, extended: bool) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&cmd) = tokens.first() else {
            continue;
        };
        match cmd {
            "print" | "p" => server.print_state().await,
            "quit" | "q" => {
                server.quit().await;
                break;
            }
            "help" | "h" => print_server_help(extended),
            "addStation" | "a" if extended => {
                if tokens.len() < 2 {
                    println!("need to list songs to make a station.");
                    continue;
                }
                let songs: Vec<String> = tokens[1..].iter().map(|s| s.to_string()).collect();
                if let Err(e) = server.add_station(&songs).await {
                    println!("could not add station: {e}");
                }
            }
            "removeStation" | "r" if extended => {
                if tokens.len() < 2 {
                    println!("need to list a station to remove.");
                    continue;
                }
                match tokens[1].parse::<u16>() {
                    Ok(index) => {
                        if let Err(e) = server.remove_station(index).await {
                            println!("could not remove station: {e}");
                        }
                    }
                    Err(_) => println!("could not recognize number {}", tokens[1]),
                }
            }
            _ => println!("could not recognize command. Try again."),
        }
    }
}

fn print_control_help(extended: bool) {
    println!("Commands:");
    println!("[station number] --> Plays that station (0 indexed)");
    println!("quit q --> Quits Client");
    println!("help h --> Prints this message");
    if extended {
        println!("getSongs [station number] --> Prints all the songs playing on that station");
        println!("allStations --> Prints all the songs playing on all known stations");
    }
}

/// Control client: holds the TCP connection used to drive a server's
/// stations from the command line.
pub struct ControlClient {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    num_stations: Arc<AtomicU16>,
    extended: bool,
}

impl ControlClient {
    /// Connect, send `HELLO`, and wait for `WELCOME`.
    pub async fn connect(host: &str, server_port: u16, udp_port: u16, extended: bool) -> Result<ControlClient> {
        let stream = TcpStream::connect((host, server_port)).await?;
        let (mut read_half, write_half) = stream.into_split();

        let hello = Command::Hello { udp_port }.encode()?;
        let writer = Arc::new(Mutex::new(write_half));
        writer.lock().await.write_all(&hello).await?;

        let mut buf = vec![0u8; CONTROL_BUFFER];
        let n = read_half.read(&mut buf).await?;
        if n == 0 {
            return Err(RadioError::Protocol("server closed connection during handshake".into()));
        }
        let num_stations = match Reply::decode(&buf[..n])? {
            Reply::Welcome { num_stations } => num_stations,
            other => {
                return Err(RadioError::Protocol(format!(
                    "expected WELCOME, got {other:?}"
                )))
            }
        };
        println!("> The server has {num_stations} stations.");

        let num_stations = Arc::new(AtomicU16::new(num_stations));
        tokio::spawn(receive_replies(read_half, Arc::clone(&num_stations), extended));

        Ok(ControlClient {
            writer,
            num_stations,
            extended,
        })
    }

    pub async fn set_station(&self, station_index: u16) -> Result<()> {
        let frame = Command::SetStation { station_index }.encode()?;
        self.writer.lock().await.write_all(&frame).await?;
        Ok(())
    }

    pub async fn get_station_songs(&self, station_index: u16) -> Result<()> {
        let frame = Command::GetStationSongs { station_index }.encode()?;
        self.writer.lock().await.write_all(&frame).await?;
        Ok(())
    }

    pub async fn all_stations(&self) -> Result<()> {
        let num_stations = self.num_stations.load(Ordering::SeqCst);
        for index in 0..num_stations {
            self.get_station_songs(index).await?;
        }
        Ok(())
    }

    async fn quit(&self) {
        let _ = self.writer.lock().await.shutdown().await;
    }

    /// Drive the interactive prompt until the user quits.
    pub async fn run_repl(self) {
        println!("Type in a number to set the station we're listening to to that number.");
        println!("Type in 'q' or press CTRL+C to quit.");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            prompt();
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) | Err(_) => break,
            };
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let Some(&cmd) = tokens.first() else {
                continue;
            };
            match cmd {
                "q" | "quit" => {
                    self.quit().await;
                    println!("Exiting music client, thanks for listening!");
                    break;
                }
                "h" | "help" => print_control_help(self.extended),
                "getSongs" | "g" if self.extended => match tokens.get(1).and_then(|s| s.parse::<u16>().ok()) {
                    Some(index) => {
                        if let Err(e) = self.get_station_songs(index).await {
                            println!("{e}");
                        }
                    }
                    None => println!("Provide a station in order to get the playlist."),
                },
                "allStations" if self.extended => {
                    if let Err(e) = self.all_stations().await {
                        println!("{e}");
                    }
                }
                other => match other.parse::<u16>() {
                    Ok(station_index) => {
                        println!("Waiting for an announce...");
                        if let Err(e) = self.set_station(station_index).await {
                            println!("{e}");
                        }
                    }
                    Err(_) => println!(
                        "Could not change to station {other}. Did not recognize the number. Try Again."
                    ),
                },
            }
        }
        println!("Thanks for listening!");
    }
}

async fn receive_replies(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    num_stations: Arc<AtomicU16>,
    extended: bool,
) {
    let mut buf = vec![0u8; CONTROL_BUFFER];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let reply = match Reply::decode(&buf[..n]) {
            Ok(r) => r,
            Err(_) => {
                println!("invalid command: could not recognize reply type from server");
                return;
            }
        };
        match reply {
            Reply::Announce { song_name } => println!("New song announced: {song_name}"),
            Reply::Invalid { message } => {
                println!("invalid command: {message}");
                return;
            }
            Reply::Welcome { .. } => {
                println!("invalid command: received more than one welcome message");
                return;
            }
            Reply::SongsList { songs } if extended => println!("Songs: {}", songs.join(", ")),
            Reply::NewStation {
                station_index,
                num_stations: n,
            } if extended => {
                num_stations.store(n, Ordering::SeqCst);
                println!("There's a new station {station_index}");
            }
            Reply::StationShutdown {
                station_index,
                num_stations: n,
            } if extended => {
                num_stations.store(n, Ordering::SeqCst);
                println!("Station {station_index} shut down. Please select another");
            }
            _ => {
                println!("invalid command: could not recognize reply type from server");
                return;
            }
        }
    }
}

/// Write every UDP datagram payload received on `local_port` to stdout
/// verbatim, until the process is asked to stop.
pub async fn run_listener(local_port: u16) -> Result<()> {
    let socket = tokio::net::UdpSocket::bind(("0.0.0.0", local_port)).await?;
    let mut buf = vec![0u8; crate::config::CHUNK];
    let mut stdout = tokio::io::stdout();
    loop {
        tokio::select! {
            result = socket.recv(&mut buf) => {
                let n = result?;
                stdout.write_all(&buf[..n]).await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
        }
    }
}
