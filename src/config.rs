/* -*- mode: rust; indent-tabs-mode: nil; tab-width: 2 -*-
 *
 * config.rs - Static proxy configuration, fixed at startup.
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
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::ValueEnum;
use reqwest::Url;
use thiserror::Error;

pub static DEFAULT_ENDPOINT: &str = "https://dns.google.com/resolve";
pub static DEFAULT_ADDRESS: &str = ":53";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("-default is required")]
  MissingEndpoint,

  #[error("invalid endpoint `{url}`: {source}")]
  InvalidEndpoint {
    url: String,
    #[source]
    source: url::ParseError,
  },

  #[error("endpoint `{0}` is not an http(s) URL")]
  UnsupportedScheme(String),

  #[error("invalid listen address `{0}`")]
  InvalidAddress(String),
}

/// What to do with an upstream record whose data does not parse for its
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RecordPolicy {
  /// Leave the record out and answer with the rest.
  #[default]
  Drop,
  /// Fail the whole exchange with SERVFAIL.
  Fail,
}

/// Read-only settings shared by every exchange.
#[derive(Debug, Clone)]
pub struct Config {
  pub endpoint: Url,
  pub subnet: Option<String>,
  pub debug: bool,
  pub record_policy: RecordPolicy,
  /// `None` keeps the HTTP client's own default.
  pub upstream_timeout: Option<Duration>,
}

impl Config {
  pub fn new(endpoint: &str) -> Result<Config, ConfigError> {
    if endpoint.is_empty() {
      return Err(ConfigError::MissingEndpoint);
    }

    let url = Url::parse(endpoint).map_err(|source| ConfigError::InvalidEndpoint {
      url: endpoint.to_string(),
      source,
    })?;

    match url.scheme() {
      "http" | "https" => (),
      _ => return Err(ConfigError::UnsupportedScheme(endpoint.to_string())),
    }

    Ok(Config {
      endpoint: url,
      subnet: None,
      debug: false,
      record_policy: RecordPolicy::default(),
      upstream_timeout: None,
    })
  }

  /// An empty subnet is the same as none.
  pub fn with_subnet<S: Into<String>>(mut self, subnet: S) -> Config {
    let subnet = subnet.into();
    self.subnet = if subnet.is_empty() { None } else { Some(subnet) };
    self
  }

  pub fn with_debug(mut self, debug: bool) -> Config {
    self.debug = debug;
    self
  }

  pub fn with_record_policy(mut self, policy: RecordPolicy) -> Config {
    self.record_policy = policy;
    self
  }

  pub fn with_upstream_timeout(mut self, timeout: Option<Duration>) -> Config {
    self.upstream_timeout = timeout;
    self
  }
}

/// Parses `host:port`, where an empty host (`:53`) means every IPv4
/// interface.
pub fn parse_listen_addr(address: &str) -> Result<SocketAddr, ConfigError> {
  if let Some(port) = address.strip_prefix(':') {
    let port: u16 = port
      .parse()
      .map_err(|_| ConfigError::InvalidAddress(address.to_string()))?;
    return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
  }

  address
    .parse()
    .map_err(|_| ConfigError::InvalidAddress(address.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_endpoint_is_accepted() {
    let config = Config::new(DEFAULT_ENDPOINT).unwrap();
    assert_eq!(config.endpoint.as_str(), DEFAULT_ENDPOINT);
    assert_eq!(config.subnet, None);
    assert!(!config.debug);
    assert_eq!(config.record_policy, RecordPolicy::Drop);
    assert_eq!(config.upstream_timeout, None);
  }

  #[test]
  fn empty_endpoint_is_fatal() {
    assert!(matches!(Config::new(""), Err(ConfigError::MissingEndpoint)));
  }

  #[test]
  fn endpoint_must_be_http() {
    assert!(matches!(
      Config::new("not a url"),
      Err(ConfigError::InvalidEndpoint { .. })
    ));
    assert!(matches!(
      Config::new("ftp://dns.example/resolve"),
      Err(ConfigError::UnsupportedScheme(_))
    ));
  }

  #[test]
  fn empty_subnet_is_unset() {
    let config = Config::new(DEFAULT_ENDPOINT).unwrap().with_subnet("");
    assert_eq!(config.subnet, None);

    let config = config.with_subnet("192.0.2.0/24");
    assert_eq!(config.subnet.as_deref(), Some("192.0.2.0/24"));
  }

  #[test]
  fn listen_address_forms() {
    assert_eq!(
      parse_listen_addr(DEFAULT_ADDRESS).unwrap(),
      "0.0.0.0:53".parse::<SocketAddr>().unwrap()
    );
    assert_eq!(
      parse_listen_addr("127.0.0.1:8500").unwrap(),
      "127.0.0.1:8500".parse::<SocketAddr>().unwrap()
    );
    assert_eq!(
      parse_listen_addr("[::1]:5353").unwrap(),
      "[::1]:5353".parse::<SocketAddr>().unwrap()
    );
    assert!(parse_listen_addr(":dns").is_err());
    assert!(parse_listen_addr("localhost").is_err());
  }
}
