/* -*- mode: rust; indent-tabs-mode: nil; tab-width: 2 -*-
 *
 * main.rs - Command line entry point.
 *
 * This file is part of dns-json-proxy.
 *
 * Copyright 2017-2018 Michael Farrell <micolous+git@gmail.com>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */
#[macro_use]
extern crate log;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use nix::sys::signal::{SigSet, Signal};

use dns_json_proxy::config::{parse_listen_addr, DEFAULT_ADDRESS, DEFAULT_ENDPOINT};
use dns_json_proxy::{Config, DnsServer, Pdns, Proxy, RecordPolicy};

/// DNS proxy server answering UDP and TCP queries through a JSON
/// DNS-over-HTTPS endpoint.
#[derive(Parser, Debug)]
#[command(name = "dns-json-proxy", version, about)]
struct Args {
  /// Address to listen to (TCP and UDP)
  #[arg(long, default_value = DEFAULT_ADDRESS)]
  address: String,

  /// DNS-over-HTTPS service endpoint
  #[arg(long = "default", default_value = DEFAULT_ENDPOINT)]
  endpoint: String,

  /// edns_client_subnet argument to pass
  #[arg(long, default_value = "")]
  subnet: String,

  /// Verbose debugging
  #[arg(long)]
  debug: bool,

  /// Upstream HTTP timeout in seconds (default: the HTTP client's)
  #[arg(long)]
  timeout: Option<u64>,

  /// What to do with upstream records that do not parse
  #[arg(long, value_enum, default_value_t = RecordPolicy::Drop)]
  record_errors: RecordPolicy,
}

fn main() -> Result<()> {
  let args = Args::parse();

  let level = if args.debug { "debug" } else { "info" };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

  let config = Config::new(&args.endpoint)?
    .with_subnet(args.subnet)
    .with_debug(args.debug)
    .with_record_policy(args.record_errors)
    .with_upstream_timeout(args.timeout.map(Duration::from_secs));
  let address = parse_listen_addr(&args.address)?;

  // Block the signals before any thread exists, so every thread inherits the
  // mask and only the wait below sees them.
  let mut signals = SigSet::empty();
  signals.add(Signal::SIGINT);
  signals.add(Signal::SIGTERM);
  signals.thread_block().context("failed to block signals")?;

  let pdns = Pdns::new(config.upstream_timeout).context("failed to set up HTTP client")?;
  let endpoint = config.endpoint.clone();
  let server = DnsServer::bind(address, Proxy::new(config, pdns))
    .with_context(|| format!("couldn't bind to {}", address))?;
  let server = server.spawn().context("failed to start listeners")?;

  info!("Listening for DNS requests on {} (udp, tcp), forwarding to {}", server.local_addr(), endpoint);

  let signal = signals.wait().context("failed to wait for signals")?;
  info!("Got {:?}, shutting down", signal);
  server.shutdown();

  Ok(())
}
