/* -*- mode: rust; indent-tabs-mode: nil; tab-width: 2 -*-
 *
 * compose.rs - Builds the DNS reply from the request and the JSON answer.
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
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};

use crate::config::RecordPolicy;
use crate::error::ProxyError;
use crate::pdns::DnsResponse;
use crate::rr::synthesize_section;

const HEADER_LEN: usize = 12;

/// An inbound query, plus whether its sender compressed names.
#[derive(Debug, Clone)]
pub struct DnsRequest {
  message: Message,
  compress: bool,
}

impl DnsRequest {
  pub fn new(message: Message, compress: bool) -> DnsRequest {
    DnsRequest { message, compress }
  }

  pub fn from_bytes(buf: &[u8]) -> Result<DnsRequest, ProxyError> {
    let message = Message::from_vec(buf).map_err(ProxyError::MalformedRequest)?;
    Ok(DnsRequest::new(message, uses_name_compression(buf)))
  }

  pub fn id(&self) -> u16 {
    self.message.id()
  }

  /// True when the QR bit is set, i.e. this is not a query at all.
  pub fn is_response(&self) -> bool {
    self.message.message_type() == MessageType::Response
  }

  pub fn queries(&self) -> &[Query] {
    self.message.queries()
  }

  /// The only question that is ever forwarded.
  pub fn first_question(&self) -> Option<&Query> {
    self.message.queries().first()
  }

  pub fn compress(&self) -> bool {
    self.compress
  }

  pub fn message(&self) -> &Message {
    &self.message
  }
}

/// Looks for a compression pointer in the question names of a raw message.
pub fn uses_name_compression(buf: &[u8]) -> bool {
  if buf.len() < HEADER_LEN {
    return false;
  }

  let qdcount = u16::from_be_bytes([buf[4], buf[5]]);
  let mut offset = HEADER_LEN;

  for _ in 0..qdcount {
    loop {
      let len = match buf.get(offset) {
        Some(&len) => len,
        None => return false,
      };

      if len & 0xC0 == 0xC0 {
        return true;
      }
      offset += 1;
      if len == 0 {
        break;
      }
      offset += len as usize;
    }

    // QTYPE and QCLASS
    offset += 4;
  }

  false
}

/// Only the low four bits fit in the header; anything larger wraps.
fn rcode_from_status(status: u32) -> ResponseCode {
  ResponseCode::from(0, (status & 0x0F) as u8)
}

/// Assembles the reply for `request` out of a decoded JSON response.
///
/// The JSON schema has no question class, so each JSON question takes the
/// class of the request question at the same position. A JSON response with
/// more questions than the request cannot be aligned and is an error.
pub fn compose_response(
  request: &DnsRequest,
  response: &DnsResponse,
  policy: RecordPolicy,
) -> Result<Message, ProxyError> {
  let asked = request.queries();
  if response.question.len() > asked.len() {
    return Err(ProxyError::CompositionAlignment {
      response: response.question.len(),
      request: asked.len(),
    });
  }

  let mut questions = Vec::with_capacity(response.question.len());
  for (q, original) in response.question.iter().zip(asked) {
    let name = Name::from_ascii(&q.name).map_err(|e| ProxyError::QuestionName {
      name: q.name.clone(),
      reason: e.to_string(),
    })?;

    let mut query = Query::query(name, RecordType::from(q.typ));
    query.set_query_class(original.query_class());
    questions.push(query);
  }

  let answers = synthesize_section(&response.answer, policy)?;
  let authorities = synthesize_section(&response.authority, policy)?;
  let additionals = synthesize_section(&response.additional, policy)?;

  // QR follows the resolver status rather than "this is a reply": a non-zero
  // Status yields a message with QR clear. Clients have come to expect this,
  // so the coupling stays.
  let message_type = if response.status == 0 {
    MessageType::Response
  } else {
    MessageType::Query
  };

  let mut message = Message::new();
  message
    .set_id(request.id())
    .set_message_type(message_type)
    .set_op_code(OpCode::Query)
    .set_authoritative(false)
    .set_truncated(response.truncated)
    .set_recursion_desired(response.recursion_desired)
    .set_recursion_available(response.recursion_available)
    .set_authentic_data(response.dnssec_validated)
    .set_checking_disabled(response.dnssec_disabled)
    .set_response_code(rcode_from_status(response.status));

  message.add_queries(questions);
  message.add_answers(answers);
  message.add_name_servers(authorities);
  message.add_additionals(additionals);

  Ok(message)
}

/// A conventional error reply: same id and opcode, RD and CD echoed, the
/// first question copied, and `rcode` set.
pub fn error_reply(request: &DnsRequest, rcode: ResponseCode) -> Message {
  let original = request.message();

  let mut message = Message::new();
  message
    .set_id(original.id())
    .set_message_type(MessageType::Response)
    .set_op_code(original.op_code())
    .set_recursion_desired(original.recursion_desired())
    .set_checking_disabled(original.checking_disabled())
    .set_response_code(rcode);

  if let Some(question) = request.first_question() {
    message.add_query(question.clone());
  }

  message
}

/// Serializes `message`, writing every name in full unless `compress` is
/// set.
pub fn encode_message(message: &Message, compress: bool) -> Result<Vec<u8>, ProxyError> {
  let mut buf = Vec::with_capacity(512);
  {
    let mut encoder = BinEncoder::new(&mut buf);
    encoder.set_canonical_names(!compress);
    message.emit(&mut encoder).map_err(ProxyError::Encode)?;
  }
  Ok(buf)
}
