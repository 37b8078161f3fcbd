/* -*- mode: rust; indent-tabs-mode: nil; tab-width: 2 -*-
 *
 * pdns.rs - Rust client for JSON DNS-over-HTTPS APIs (Google Public DNS).
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
use std::io::Read;
use std::time::Duration;

use hickory_proto::op::Query;
use reqwest::blocking::{Client, Response};
use reqwest::Url;

use crate::error::ProxyError;
use crate::proxy::Upstream;

static USER_AGENT: &str = "DnsOverHttpsProxy/1";

// Every field is optional: providers leave out whatever they have nothing to
// say about, and a missing field must not fail the exchange.

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct DnsQuestion {
  pub name: String,
  #[serde(rename = "type")]
  pub typ: u16,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct DnsRecord {
  pub name: String,
  #[serde(rename = "type")]
  pub typ: u16,
  #[serde(rename = "TTL")]
  pub ttl: u32,
  pub data: String,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default)]
pub struct DnsResponse {
  #[serde(rename = "Status")]
  pub status: u32,
  #[serde(rename = "TC")]
  pub truncated: bool,

  // "Always true for Google Public DNS"
  #[serde(rename = "RD")]
  pub recursion_desired: bool,
  #[serde(rename = "RA")]
  pub recursion_available: bool,

  #[serde(rename = "AD")]
  pub dnssec_validated: bool,
  #[serde(rename = "CD")]
  pub dnssec_disabled: bool,

  #[serde(rename = "Question")]
  pub question: Vec<DnsQuestion>,
  #[serde(rename = "Answer")]
  pub answer: Vec<DnsRecord>,
  #[serde(rename = "Authority")]
  pub authority: Vec<DnsRecord>,
  #[serde(rename = "Additional")]
  pub additional: Vec<DnsRecord>,

  pub edns_client_subnet: String,

  #[serde(rename = "Comment")]
  pub comment: String,
}

/// Builds the GET URL for one question: `name`, `type` and, when set,
/// `edns_client_subnet` are appended to whatever the endpoint already has.
///
/// The name goes out exactly as it is presented, trailing dot included.
pub fn query_url(endpoint: &Url, question: &Query, subnet: Option<&str>) -> Result<Url, ProxyError> {
  if endpoint.cannot_be_a_base() {
    return Err(ProxyError::RequestConstruction(format!("`{}` cannot carry a query", endpoint)));
  }

  let mut url = endpoint.clone();
  {
    let mut params = url.query_pairs_mut();
    params.append_pair("name", &question.name().to_ascii());
    params.append_pair("type", &u16::from(question.query_type()).to_string());
    if let Some(subnet) = subnet.filter(|s| !s.is_empty()) {
      params.append_pair("edns_client_subnet", subnet);
    }
  }

  Ok(url)
}

/// Decodes a response body. The body is consumed and dropped on return.
pub fn parse_response<R: Read>(body: R) -> Result<DnsResponse, ProxyError> {
  let response: DnsResponse = serde_json::from_reader(body)?;

  if !response.comment.is_empty() {
    debug!("Upstream comment: {}", response.comment);
  }

  Ok(response)
}

pub struct Pdns {
  client: Client,
}

// https://developers.google.com/speed/public-dns/docs/doh/json
impl Pdns {
  pub fn new(timeout: Option<Duration>) -> Result<Pdns, reqwest::Error> {
    let mut builder = Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout).connect_timeout(timeout);
    }

    Ok(Pdns {
      client: builder.build()?,
    })
  }
}

impl Upstream for Pdns {
  type Body = Response;

  fn get(&self, url: Url) -> Result<Response, ProxyError> {
    let response = self
      .client
      .get(url)
      .send()
      .map_err(|e| ProxyError::UpstreamTransport(Box::new(e)))?;

    if !response.status().is_success() {
      warn!("Upstream answered with HTTP {}", response.status());
    }

    Ok(response)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;
  use std::str::FromStr;

  use hickory_proto::rr::{Name, RecordType};

  fn params(url: &Url) -> HashMap<String, String> {
    url.query_pairs().into_owned().collect()
  }

  fn endpoint() -> Url {
    Url::parse("https://dns.google.com/resolve").unwrap()
  }

  #[test]
  fn query_url_carries_name_and_type() {
    let question = Query::query(Name::from_str("example.com.").unwrap(), RecordType::AAAA);
    let url = query_url(&endpoint(), &question, None).unwrap();

    assert_eq!(url.path(), "/resolve");
    let params = params(&url);
    assert_eq!(params.len(), 2);
    assert_eq!(params["name"], "example.com.");
    assert_eq!(params["type"], "28");
  }

  #[test]
  fn query_url_adds_subnet_only_when_set() {
    let question = Query::query(Name::from_str("example.com.").unwrap(), RecordType::A);

    let url = query_url(&endpoint(), &question, Some("192.0.2.0/24")).unwrap();
    assert_eq!(params(&url)["edns_client_subnet"], "192.0.2.0/24");

    let url = query_url(&endpoint(), &question, Some("")).unwrap();
    assert!(!params(&url).contains_key("edns_client_subnet"));
  }

  #[test]
  fn query_url_keeps_endpoint_params() {
    let endpoint = Url::parse("https://resolver.example/resolve?ct=application/x-javascript").unwrap();
    let question = Query::query(Name::from_str("example.org.").unwrap(), RecordType::MX);
    let url = query_url(&endpoint, &question, None).unwrap();

    let params = params(&url);
    assert_eq!(params["ct"], "application/x-javascript");
    assert_eq!(params["type"], "15");
  }

  #[test]
  fn query_url_rejects_opaque_endpoint() {
    let endpoint = Url::parse("data:text/plain,resolve").unwrap();
    let question = Query::query(Name::from_str("example.com.").unwrap(), RecordType::A);
    assert!(matches!(
      query_url(&endpoint, &question, None),
      Err(ProxyError::RequestConstruction(_))
    ));
  }

  #[test]
  fn parse_full_response() {
    let body = r#"{
      "Status": 0, "TC": false, "RD": true, "RA": true, "AD": false, "CD": false,
      "Question": [{"name": "example.com.", "type": 1}],
      "Answer": [{"name": "example.com.", "type": 1, "TTL": 300, "data": "93.184.216.34"}],
      "Additional": [],
      "edns_client_subnet": "192.0.2.0/24",
      "Comment": "Response from 192.0.2.53."
    }"#;
    let response = parse_response(body.as_bytes()).unwrap();

    assert_eq!(response.status, 0);
    assert!(response.recursion_desired);
    assert!(response.recursion_available);
    assert_eq!(response.question, vec![DnsQuestion { name: "example.com.".into(), typ: 1 }]);
    assert_eq!(
      response.answer,
      vec![DnsRecord {
        name: "example.com.".into(),
        typ: 1,
        ttl: 300,
        data: "93.184.216.34".into(),
      }]
    );
    assert!(response.authority.is_empty());
    assert_eq!(response.edns_client_subnet, "192.0.2.0/24");
  }

  #[test]
  fn absent_fields_default() {
    let response = parse_response(&b"{}"[..]).unwrap();
    assert_eq!(response, DnsResponse::default());

    let response = parse_response(&br#"{"Status": 3, "Authority": [{"name": "com."}]}"#[..]).unwrap();
    assert_eq!(response.status, 3);
    assert_eq!(response.authority[0].ttl, 0);
    assert_eq!(response.authority[0].data, "");
  }

  #[test]
  fn malformed_bodies_are_rejected() {
    for body in ["", "{\"Status\": 0,", "<html>", "{\"Status\": \"ok\"}", "{\"Answer\": 5}"] {
      assert!(
        matches!(parse_response(body.as_bytes()), Err(ProxyError::MalformedResponse(_))),
        "accepted {:?}",
        body
      );
    }
  }
}
