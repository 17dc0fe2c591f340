//! Exercises the `clap` surface directly, without binding a socket;
//! `serve`/`connect`'s actual behavior is covered end-to-end by
//! `rsh-core`'s own integration tests.

use clap::Parser;
use rsh_cli::{Args, Commands};

#[test]
fn serve_parses_config_and_repeated_verbose() {
    let args = Args::parse_from(["rsh", "serve", "--config", "server.toml", "-vv"]);
    match args.command {
        Commands::Serve { config, verbose } => {
            assert_eq!(config.as_deref(), Some("server.toml"));
            assert_eq!(verbose, 2);
        }
        other => panic!("expected Serve, got {other:?}"),
    }
}

#[test]
fn serve_defaults_to_no_config_and_zero_verbosity() {
    let args = Args::parse_from(["rsh", "serve"]);
    match args.command {
        Commands::Serve { config, verbose } => {
            assert!(config.is_none());
            assert_eq!(verbose, 0);
        }
        other => panic!("expected Serve, got {other:?}"),
    }
}

#[test]
fn connect_parses_host_and_port() {
    let args = Args::parse_from(["rsh", "connect", "--host", "127.0.0.1", "--port", "9999"]);
    match args.command {
        Commands::Connect { host, port, socket, .. } => {
            assert_eq!(host.as_deref(), Some("127.0.0.1"));
            assert_eq!(port, Some(9999));
            assert!(socket.is_none());
        }
        other => panic!("expected Connect, got {other:?}"),
    }
}

#[test]
fn connect_parses_socket_and_user() {
    let args = Args::parse_from(["rsh", "connect", "--socket", "/tmp/rsh.sock", "--user", "alice"]);
    match args.command {
        Commands::Connect { socket, user, .. } => {
            assert_eq!(socket.as_deref(), Some("/tmp/rsh.sock"));
            assert_eq!(user.as_deref(), Some("alice"));
        }
        other => panic!("expected Connect, got {other:?}"),
    }
}

#[test]
fn missing_subcommand_is_rejected() {
    assert!(Args::try_parse_from(["rsh"]).is_err());
}
