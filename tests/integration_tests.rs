//! End-to-end scenarios driving a real `Server` over loopback TCP/UDP,
//! covering the concrete scenarios enumerated in SPEC_FULL.md §8.

use std::sync::Arc;
use std::time::Duration;

use broadstream::codec::{Command, Reply};
use broadstream::server::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

const FAST_TICK: Duration = Duration::from_millis(5);

fn write_temp(name: &str, contents: &[u8]) -> String {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "broadstream-e2e-test-{}-{}",
        std::process::id(),
        name
    ));
    std::fs::write(&path, contents).unwrap();
    path.to_str().unwrap().to_string()
}

async fn spawn_server(playlists: &[Vec<String>], extended: bool) -> (Arc<Server>, std::net::SocketAddr) {
    let server = Server::bind(0, playlists, extended, FAST_TICK).await.unwrap();
    let addr = server.listener_addr();
    let server = Arc::new(server);
    let listen_server = Arc::clone(&server);
    tokio::spawn(async move {
        listen_server.listen().await;
    });
    (server, addr)
}

async fn read_reply(stream: &mut TcpStream) -> Reply {
    let mut buf = vec![0u8; 4096];
    let n = timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("timed out waiting for reply")
        .unwrap();
    Reply::decode(&buf[..n]).unwrap()
}

#[tokio::test]
async fn test_scenario_welcome() {
    let songs = [
        write_temp("welcome-a", b"a"),
        write_temp("welcome-b", b"b"),
        write_temp("welcome-c", b"c"),
    ];
    let playlists: Vec<Vec<String>> = songs.iter().map(|s| vec![s.clone()]).collect();
    let (_server, addr) = spawn_server(&playlists, false).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&Command::Hello { udp_port: 4444 }.encode().unwrap())
        .await
        .unwrap();
    let reply = read_reply(&mut client).await;
    assert_eq!(reply, Reply::Welcome { num_stations: 3 });
}

#[tokio::test]
async fn test_scenario_subscribe_and_receive_udp_chunks() {
    let song_a = write_temp("subscribe-songa", &vec![42u8; 600]);
    let (_server, addr) = spawn_server(&[vec![song_a.clone()]], false).await;

    let udp_listener = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let udp_port = udp_listener.local_addr().unwrap().port();

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&Command::Hello { udp_port }.encode().unwrap())
        .await
        .unwrap();
    let _ = read_reply(&mut client).await;

    client
        .write_all(&Command::SetStation { station_index: 0 }.encode().unwrap())
        .await
        .unwrap();
    let reply = read_reply(&mut client).await;
    assert_eq!(
        reply,
        Reply::Announce {
            song_name: song_a.clone()
        }
    );

    let mut buf = [0u8; 512];
    let (n, _) = timeout(Duration::from_secs(2), udp_listener.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a datagram")
        .unwrap();
    assert!(buf[..n].iter().all(|&b| b == 42));
}

#[tokio::test]
async fn test_scenario_reject_out_of_range_station() {
    let song_a = write_temp("reject-a", b"a");
    let (_server, addr) = spawn_server(&[vec![song_a]], false).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&Command::Hello { udp_port: 4445 }.encode().unwrap())
        .await
        .unwrap();
    let _ = read_reply(&mut client).await;

    client
        .write_all(&Command::SetStation { station_index: 9 }.encode().unwrap())
        .await
        .unwrap();
    let reply = read_reply(&mut client).await;
    assert_eq!(
        reply,
        Reply::Invalid {
            message: "station 9 doesn't exist".to_string()
        }
    );
}

#[tokio::test]
async fn test_scenario_songs_list_extended() {
    let a = write_temp("songslist-a", b"a");
    let b = write_temp("songslist-b", b"b");
    let c = write_temp("songslist-c", b"c");
    let (_server, addr) = spawn_server(&[vec![a.clone(), b.clone(), c.clone()]], true).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&Command::Hello { udp_port: 4446 }.encode().unwrap())
        .await
        .unwrap();
    let _ = read_reply(&mut client).await;

    client
        .write_all(&Command::GetStationSongs { station_index: 0 }.encode().unwrap())
        .await
        .unwrap();
    let reply = read_reply(&mut client).await;
    assert_eq!(
        reply,
        Reply::SongsList {
            songs: vec![a, b, c]
        }
    );
}

#[tokio::test]
async fn test_scenario_add_station_notification() {
    let a = write_temp("addnotify-a", b"a");
    let (server, addr) = spawn_server(&[vec![a]], true).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&Command::Hello { udp_port: 4447 }.encode().unwrap())
        .await
        .unwrap();
    let _ = read_reply(&mut client).await;
    // Give the accept loop a moment to register the session before the
    // notification broadcast goes out.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let songs_x = write_temp("addnotify-x", b"x");
    server.add_station(&[songs_x]).await.unwrap();

    let reply = read_reply(&mut client).await;
    assert_eq!(
        reply,
        Reply::NewStation {
            station_index: 1,
            num_stations: 2,
        }
    );
}

#[tokio::test]
async fn test_scenario_remove_station_notification() {
    let a = write_temp("removenotify-a", b"a");
    let b = write_temp("removenotify-b", b"b");
    let (server, addr) = spawn_server(&[vec![a], vec![b]], true).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&Command::Hello { udp_port: 4449 }.encode().unwrap())
        .await
        .unwrap();
    let _ = read_reply(&mut client).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    server.remove_station(1).await.unwrap();
    let reply = read_reply(&mut client).await;
    assert_eq!(
        reply,
        Reply::StationShutdown {
            station_index: 1,
            num_stations: 1,
        }
    );
}

#[tokio::test]
async fn test_scenario_switching_station_leaves_the_prior_one() {
    let a = write_temp("switch-a", b"a");
    let b = write_temp("switch-b", b"b");
    let (server, addr) = spawn_server(&[vec![a], vec![b]], false).await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(&Command::Hello { udp_port: 4450 }.encode().unwrap())
        .await
        .unwrap();
    let _ = read_reply(&mut client).await;

    client
        .write_all(&Command::SetStation { station_index: 0 }.encode().unwrap())
        .await
        .unwrap();
    let _ = read_reply(&mut client).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(server.radio().station_listeners(0).await.unwrap().len(), 1);

    client
        .write_all(&Command::SetStation { station_index: 1 }.encode().unwrap())
        .await
        .unwrap();
    let _ = read_reply(&mut client).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(server.radio().station_listeners(0).await.unwrap().len(), 0);
    assert_eq!(server.radio().station_listeners(1).await.unwrap().len(), 1);
}
