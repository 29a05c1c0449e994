//! Command-line interface definitions for chainmux.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::Parser;
use std::path::PathBuf;

use crate::proxy::DEFAULT_LISTEN_ADDR;

/// Environment variable consulted when `--conf` is not given.
pub const CONF_FILE_ENV: &str = "PDX_CHAINMUX_CONF_FILE";

const LONG_ABOUT: &str = "\
PDX chainmux, an HTTP-CONNECT based, whitelisted rewritable HTTP & TCP proxy.

The configuration file holds one whitelist item per line; the first match
is selected. Each line is `proto://asked_host:asked_port` optionally
followed by whitespace and `target_host:target_port`. Here, proto is conn
for HTTP-CONNECT based tunneling and http for the plain HTTP proxy. A line
with only a pattern allows matching requests unchanged. For example:

    conn://chain-x:30303 localhost:30308
    http://pdx.ltd:80    localhost:80
    conn://*.pdx.ltd:*

Send `GET http://localhost:<port>/chainmux/reconf` through the proxy from
the local host, or SIGHUP the process, to reload the file.";

/// HTTP-CONNECT based, whitelisted and rewritable HTTP & TCP proxy.
#[derive(Parser, Debug)]
#[command(name = "chainmux")]
#[command(author, version, about, long_about = LONG_ABOUT)]
pub struct Cli {
    /// The whitelist file.
    #[arg(short = 'c', long = "conf", value_name = "PATH", env = CONF_FILE_ENV)]
    pub conf: PathBuf,

    /// The [host]:port chainmux listens on.
    ///
    /// An empty host listens on all interfaces.
    #[arg(short = 'a', long = "addr", value_name = "[HOST]:PORT", default_value = DEFAULT_LISTEN_ADDR)]
    pub addr: String,

    /// Also write audit events to the local syslog daemon.
    #[arg(long = "syslog")]
    pub syslog: bool,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = debug level
    /// -vv   = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}
