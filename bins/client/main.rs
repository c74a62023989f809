//! # Stock Client
//!
//! Talks to the stock server over its line protocol.
//!
//! - Interactive mode (default): reads commands from stdin, prints each
//!   reply, and stops once the server answers `exit`.
//! - Load mode (`--clients N`): N threads each open their own connection,
//!   send `--requests` random `show`/`buy`/`sell` commands, then `exit`.

use rand::Rng;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

/// Command-line options for the client
#[derive(Debug, StructOpt)]
#[structopt(name = "stock_client", about = "TCP client for the stock server")]
struct Opt {
    /// Server host
    host: String,

    /// Server port
    port: u16,

    /// Run N concurrent random clients instead of the interactive prompt
    #[structopt(short, long)]
    clients: Option<usize>,

    /// Requests per client in load mode
    #[structopt(short, long, default_value = "10")]
    requests: usize,

    /// Highest stock id drawn in load mode
    #[structopt(short, long, default_value = "10")]
    max_id: i64,
}

/// Open connection: the socket for requests and a buffered reader over a
/// clone of it for replies.
struct Session {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

/// Connects to the TCP stock server
fn connect(host: &str, port: u16) -> io::Result<Session> {
    let stream = TcpStream::connect((host, port))?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let reader = BufReader::new(stream.try_clone()?);
    Ok(Session { stream, reader })
}

/// Reads one reply body. Each reply ends with an empty line.
fn read_reply(reader: &mut impl BufRead) -> io::Result<String> {
    let mut body = String::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Server closed connection",
            ));
        }
        if line == "\n" {
            return Ok(body);
        }
        body.push_str(&line);
    }
}

/// Sends one command and returns the server's reply.
fn send_command(session: &mut Session, command: &str) -> io::Result<String> {
    session.stream.write_all(command.as_bytes())?;
    session.stream.write_all(b"\n")?;
    session.stream.flush()?;
    read_reply(&mut session.reader)
}

/// Builds a random request the way a trading desk would fire them.
fn random_command(rng: &mut impl Rng, max_id: i64) -> String {
    let id = rng.gen_range(1..=max_id.max(1));
    let amount = rng.gen_range(1..=10);
    match rng.gen_range(0..3) {
        0 => "show".to_string(),
        1 => format!("buy {} {}", id, amount),
        _ => format!("sell {} {}", id, amount),
    }
}

fn run_load(opt: &Opt, clients: usize) -> io::Result<()> {
    let start = Instant::now();
    let handles: Vec<_> = (0..clients)
        .map(|n| {
            let host = opt.host.clone();
            let port = opt.port;
            let requests = opt.requests;
            let max_id = opt.max_id;
            thread::spawn(move || -> io::Result<()> {
                let mut session = connect(&host, port)?;
                let mut rng = rand::thread_rng();
                for _ in 0..requests {
                    let command = random_command(&mut rng, max_id);
                    let reply = send_command(&mut session, &command)?;
                    println!("[client {}] {} -> {}", n, command, reply.trim_end());
                }
                send_command(&mut session, "exit")?;
                Ok(())
            })
        })
        .collect();

    let mut failures = 0;
    for handle in handles {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                eprintln!("Client failed: {}", e);
                failures += 1;
            }
            Err(_) => failures += 1,
        }
    }

    println!(
        "{} clients x {} requests finished in {:?} ({} failed)",
        clients,
        opt.requests,
        start.elapsed(),
        failures
    );
    Ok(())
}

fn run_interactive(opt: &Opt) -> io::Result<()> {
    let mut session = connect(&opt.host, opt.port)?;
    println!("Connected to TCP server at {}:{}", opt.host, opt.port);

    let stdin = io::stdin();
    loop {
        print!("stock-client> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let reply = send_command(&mut session, input.trim_end_matches(['\r', '\n']))?;
        if reply.trim_end() == "exit" {
            println!("Exiting client.");
            break;
        }
        print!("{}", reply);
    }
    Ok(())
}

fn main() -> io::Result<()> {
    let opt = Opt::from_args();

    match opt.clients {
        Some(clients) => run_load(&opt, clients),
        None => run_interactive(&opt),
    }
}
