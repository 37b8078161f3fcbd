/* -*- mode: rust; indent-tabs-mode: nil; tab-width: 2 -*-
 *
 * proxy.rs - Forwards one DNS request over HTTPS and writes the reply.
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
use std::io::{self, Read};

use hickory_proto::op::ResponseCode;
use reqwest::Url;

use crate::compose::{compose_response, encode_message, error_reply, DnsRequest};
use crate::config::Config;
use crate::error::ProxyError;
use crate::pdns::{parse_response, query_url};

/// Performs the HTTP GET against the resolver.
pub trait Upstream {
  type Body: Read;

  fn get(&self, url: Url) -> Result<Self::Body, ProxyError>;
}

/// Sends a reply back to whoever asked. Consumed by the one write it gets.
pub trait ResponseWriter {
  fn write_response(self, reply: &[u8]) -> io::Result<()>;
}

pub struct Proxy<U> {
  config: Config,
  upstream: U,
}

impl<U: Upstream> Proxy<U> {
  pub fn new(config: Config, upstream: U) -> Proxy<U> {
    Proxy { config, upstream }
  }

  /// Answers `request` through `writer`, exactly once. Failures before the
  /// write turn into a FORMERR (nothing to ask) or SERVFAIL reply; a failed
  /// write can only be logged.
  pub fn handle<W: ResponseWriter>(&self, request: &DnsRequest, writer: W) -> Result<(), ProxyError> {
    let reply = match self.resolve(request) {
      Ok(reply) => reply,
      Err(e) => {
        error!("{}", e);
        let rcode = match e {
          ProxyError::NoQuestion => ResponseCode::FormErr,
          _ => ResponseCode::ServFail,
        };
        encode_message(&error_reply(request, rcode), request.compress())?
      }
    };

    writer.write_response(&reply).map_err(|e| {
      error!("Error writing DNS response: {}", e);
      ProxyError::Write(e)
    })
  }

  /// One upstream round trip: encode, fetch, decode, compose.
  pub fn resolve(&self, request: &DnsRequest) -> Result<Vec<u8>, ProxyError> {
    let question = request.first_question().ok_or(ProxyError::NoQuestion)?;
    if request.queries().len() > 1 {
      debug!("Forwarding only the first of {} questions", request.queries().len());
    }

    let url = query_url(&self.config.endpoint, question, self.config.subnet.as_deref())?;
    if self.config.debug {
      debug!("{}", url);
    }

    let body = self.upstream.get(url)?;
    let response = parse_response(body)?;
    debug!("Response: {:?}", response);

    let message = compose_response(request, &response, self.config.record_policy)?;
    encode_message(&message, request.compress())
  }
}
