use clap::Parser;

use super::*;

fn parse(args: &[&str]) -> Config {
    let mut full = vec!["fleetbrokerd"];
    full.extend(args);
    Config::parse_from(full)
}

#[test]
fn defaults_are_sane() {
    let cfg = parse(&[]);
    assert_eq!(cfg.port, 4600);
    assert_eq!(cfg.host, "127.0.0.1");
    assert!(cfg.auth_token.is_none());
    assert_eq!(cfg.log_format, "json");
    assert_eq!(cfg.ticket_timeout_ms, 30_000);
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_non_ipv4_host() {
    let cfg = parse(&["--host", "::1"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_bad_log_format() {
    let cfg = parse(&["--log-format", "xml"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_zero_timeout() {
    let cfg = parse(&["--ticket-timeout-ms", "0"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn socket_addr_combines_host_and_port() {
    let cfg = parse(&["--host", "0.0.0.0", "--port", "9001"]);
    let addr = cfg.socket_addr().unwrap();
    assert_eq!(addr.port(), 9001);
    assert_eq!(addr.ip(), std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)));
}
