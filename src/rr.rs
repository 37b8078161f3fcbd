/* -*- mode: rust; indent-tabs-mode: nil; tab-width: 2 -*-
 *
 * rr.rs - Turns JSON resource records into DNS resource records.
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

//! The JSON API hands out RDATA already in master file presentation form
//! ("93.184.216.34", "10 mail.example.com.", "\"v=spf1 -all\""), so rather
//! than converting each type by hand, every record is written out as a
//! master file line and read back with hickory's RDATA text parser.
//!
//! The JSON schema has no class field; records are always `IN`.

use std::str::FromStr;

use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use hickory_proto::serialize::txt::RDataParser;

use crate::config::RecordPolicy;
use crate::error::ProxyError;
use crate::pdns::DnsRecord;

/// Presentation mnemonic for a type code; codes hickory has no name for use
/// the RFC 3597 `TYPEnnn` form.
fn type_mnemonic(rtype: RecordType) -> String {
  match rtype {
    RecordType::Unknown(code) => format!("TYPE{}", code),
    known => known.to_string(),
  }
}

fn parse_type(token: &str) -> Result<RecordType, String> {
  if let Some(code) = token.strip_prefix("TYPE") {
    if let Ok(code) = code.parse::<u16>() {
      return Ok(RecordType::from(code));
    }
  }

  RecordType::from_str(token).map_err(|e| e.to_string())
}

/// `<name> <TTL> IN <type> <data>`
pub fn master_line(record: &DnsRecord) -> String {
  format!(
    "{} {} {} {} {}",
    record.name,
    record.ttl,
    DNSClass::IN,
    type_mnemonic(RecordType::from(record.typ)),
    record.data
  )
}

/// Reads one `<name> <TTL> <class> <type> <rdata>` line. The line must be
/// single-space separated up to the RDATA, which is everything after the
/// type and goes to the RDATA parser untouched.
pub fn parse_master_line(line: &str) -> Result<Record, String> {
  let mut fields = line.splitn(5, ' ');
  let mut next = |what: &str| {
    fields
      .next()
      .filter(|f| !f.is_empty())
      .ok_or_else(|| format!("missing {}", what))
  };

  let name = next("owner name")?;
  let ttl = next("TTL")?;
  let class = next("class")?;
  let rtype = next("type")?;
  let rdata = fields.next().unwrap_or("");

  let name = Name::from_ascii(name).map_err(|e| e.to_string())?;
  let ttl = ttl.parse::<u32>().map_err(|e| format!("bad TTL `{}`: {}", ttl, e))?;
  let class = DNSClass::from_str(class).map_err(|e| e.to_string())?;
  let rtype = parse_type(rtype)?;
  let rdata = RData::try_from_str(rtype, rdata).map_err(|e| e.to_string())?;

  let mut record = Record::from_rdata(name, ttl, rdata);
  record.set_dns_class(class);
  Ok(record)
}

/// Converts one JSON record. The data is trusted to be in the presentation
/// format of its type; only the text parser checks it.
pub fn synthesize_record(record: &DnsRecord) -> Result<Record, ProxyError> {
  let line = master_line(record);
  parse_master_line(&line).map_err(|reason| ProxyError::RecordSynthesis { line, reason })
}

/// Converts a whole section in order. Under `RecordPolicy::Drop` records
/// that fail are logged and left out; under `RecordPolicy::Fail` the first
/// failure is returned.
pub fn synthesize_section(records: &[DnsRecord], policy: RecordPolicy) -> Result<Vec<Record>, ProxyError> {
  let mut out = Vec::with_capacity(records.len());

  for record in records {
    match synthesize_record(record) {
      Ok(rr) => out.push(rr),
      Err(e) => match policy {
        RecordPolicy::Drop => warn!("Dropping record: {}", e),
        RecordPolicy::Fail => return Err(e),
      },
    }
  }

  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::{Ipv4Addr, Ipv6Addr};

  use hickory_proto::rr::rdata::{A, AAAA};

  fn record(name: &str, typ: u16, ttl: u32, data: &str) -> DnsRecord {
    DnsRecord {
      name: name.to_string(),
      typ,
      ttl,
      data: data.to_string(),
    }
  }

  fn name(s: &str) -> Name {
    Name::from_str(s).unwrap()
  }

  #[test]
  fn address_record() {
    let rr = synthesize_record(&record("example.com.", 1, 300, "93.184.216.34")).unwrap();

    assert_eq!(rr.name(), &name("example.com."));
    assert_eq!(rr.ttl(), 300);
    assert_eq!(rr.dns_class(), DNSClass::IN);
    assert_eq!(rr.record_type(), RecordType::A);
    assert_eq!(rr.data(), Some(&RData::A(A(Ipv4Addr::new(93, 184, 216, 34)))));
  }

  #[test]
  fn ipv6_address_record() {
    let rr = synthesize_record(&record("example.com.", 28, 60, "2001:db8::1")).unwrap();
    assert_eq!(
      rr.data(),
      Some(&RData::AAAA(AAAA(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1))))
    );
  }

  #[test]
  fn name_and_multi_field_records() {
    let rr = synthesize_record(&record("www.example.com.", 5, 3600, "example.com.")).unwrap();
    match rr.data() {
      Some(RData::CNAME(cname)) => assert_eq!(cname.0, name("example.com.")),
      other => panic!("expected CNAME, got {:?}", other),
    }

    let rr = synthesize_record(&record("example.com.", 15, 3600, "10 mail.example.com.")).unwrap();
    match rr.data() {
      Some(RData::MX(mx)) => {
        assert_eq!(mx.preference(), 10);
        assert_eq!(mx.exchange(), &name("mail.example.com."));
      }
      other => panic!("expected MX, got {:?}", other),
    }

    let soa = "ns1.example.com. hostmaster.example.com. 2024010101 7200 3600 1209600 300";
    let rr = synthesize_record(&record("example.com.", 6, 1800, soa)).unwrap();
    match rr.data() {
      Some(RData::SOA(soa)) => {
        assert_eq!(soa.mname(), &name("ns1.example.com."));
        assert_eq!(soa.serial(), 2024010101);
        assert_eq!(soa.minimum(), 300);
      }
      other => panic!("expected SOA, got {:?}", other),
    }
  }

  #[test]
  fn quoted_text_record() {
    let rr = synthesize_record(&record("example.com.", 16, 300, "\"v=spf1 -all\"")).unwrap();
    match rr.data() {
      Some(RData::TXT(txt)) => {
        assert_eq!(txt.txt_data().len(), 1);
        assert_eq!(&*txt.txt_data()[0], &b"v=spf1 -all"[..]);
      }
      other => panic!("expected TXT, got {:?}", other),
    }
  }

  #[test]
  fn master_line_format() {
    assert_eq!(
      master_line(&record("example.com.", 1, 300, "93.184.216.34")),
      "example.com. 300 IN A 93.184.216.34"
    );
    assert_eq!(
      master_line(&record("example.com.", 65280, 0, "\\# 0")),
      "example.com. 0 IN TYPE65280 \\# 0"
    );
  }

  #[test]
  fn parse_master_line_reads_class() {
    let rr = parse_master_line("example.com. 10 CH A 192.0.2.1").unwrap();
    assert_eq!(rr.dns_class(), DNSClass::CH);
    assert_eq!(rr.ttl(), 10);
  }

  #[test]
  fn invalid_data_fails() {
    let err = synthesize_record(&record("example.com.", 1, 300, "not-an-address")).unwrap_err();
    match err {
      ProxyError::RecordSynthesis { line, .. } => assert_eq!(line, "example.com. 300 IN A not-an-address"),
      other => panic!("unexpected error {:?}", other),
    }

    assert!(synthesize_record(&record("", 1, 300, "192.0.2.1")).is_err());
  }

  #[test]
  fn section_policy() {
    let records = vec![
      record("a.example.", 1, 30, "192.0.2.1"),
      record("b.example.", 1, 30, "bogus"),
      record("c.example.", 1, 30, "192.0.2.3"),
    ];

    let kept = synthesize_section(&records, RecordPolicy::Drop).unwrap();
    let names: Vec<String> = kept.iter().map(|rr| rr.name().to_ascii()).collect();
    assert_eq!(names, vec!["a.example.", "c.example."]);

    assert!(matches!(
      synthesize_section(&records, RecordPolicy::Fail),
      Err(ProxyError::RecordSynthesis { .. })
    ));
  }
}
