/* -*- mode: rust; indent-tabs-mode: nil; tab-width: 2 -*-
 *
 * dnsserver.rs - UDP and TCP DNS listeners.
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
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::compose::DnsRequest;
use crate::proxy::{Proxy, ResponseWriter, Upstream};

const UDP_BUFFER_SIZE: usize = 4096;
const TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(8);
// How often the listener loops look at the shutdown flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Replies to a single datagram.
pub struct UdpReply {
  socket: Arc<UdpSocket>,
  peer: SocketAddr,
}

impl ResponseWriter for UdpReply {
  fn write_response(self, reply: &[u8]) -> io::Result<()> {
    let n = self.socket.send_to(reply, self.peer)?;
    debug!("Data sent: {}", n);
    Ok(())
  }
}

/// Replies on a TCP connection, with the two byte length prefix.
pub struct TcpReply<'a> {
  stream: &'a TcpStream,
}

impl<'a> ResponseWriter for TcpReply<'a> {
  fn write_response(self, reply: &[u8]) -> io::Result<()> {
    let len = u16::try_from(reply.len())
      .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "reply longer than 65535 bytes"))?;

    let mut stream = self.stream;
    let mut framed = Vec::with_capacity(reply.len() + 2);
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(reply);
    stream.write_all(&framed)?;
    stream.flush()
  }
}

/// Parses an inbound message, dropping the ones that cannot be answered.
fn accept_request(buf: &[u8], peer: SocketAddr) -> Option<DnsRequest> {
  let request = match DnsRequest::from_bytes(buf) {
    Ok(request) => request,
    Err(e) => {
      warn!("Error parsing DNS packet from {}: {}", peer, e);
      return None;
    }
  };

  // Make sure we actually got a query, otherwise ignore it.
  if request.is_response() {
    warn!("Not a query, ignoring packet from {}", peer);
    return None;
  }

  Some(request)
}

pub struct DnsServer<U> {
  udp: Arc<UdpSocket>,
  tcp: TcpListener,
  proxy: Arc<Proxy<U>>,
}

impl<U> DnsServer<U>
where
  U: Upstream + Send + Sync + 'static,
{
  /// Binds UDP and TCP on the same address. With port 0 the TCP listener
  /// takes whatever port UDP was given.
  pub fn bind(addr: SocketAddr, proxy: Proxy<U>) -> io::Result<DnsServer<U>> {
    let udp = UdpSocket::bind(addr)?;
    let tcp = TcpListener::bind(udp.local_addr()?)?;

    udp.set_read_timeout(Some(POLL_INTERVAL))?;
    tcp.set_nonblocking(true)?;

    Ok(DnsServer {
      udp: Arc::new(udp),
      tcp,
      proxy: Arc::new(proxy),
    })
  }

  pub fn local_addr(&self) -> io::Result<SocketAddr> {
    self.udp.local_addr()
  }

  /// Starts both listeners, each on its own thread.
  pub fn spawn(self) -> io::Result<ServerHandle> {
    let addr = self.local_addr()?;
    let shutdown = Arc::new(AtomicBool::new(false));

    let udp = {
      let socket = self.udp;
      let proxy = self.proxy.clone();
      let shutdown = shutdown.clone();
      thread::Builder::new()
        .name("udp-listener".to_string())
        .spawn(move || run_udp(socket, proxy, shutdown))?
    };

    let tcp = {
      let listener = self.tcp;
      let proxy = self.proxy;
      let shutdown = shutdown.clone();
      thread::Builder::new()
        .name("tcp-listener".to_string())
        .spawn(move || run_tcp(listener, proxy, shutdown))?
    };

    Ok(ServerHandle {
      addr,
      shutdown,
      listeners: vec![udp, tcp],
    })
  }
}

fn run_udp<U>(socket: Arc<UdpSocket>, proxy: Arc<Proxy<U>>, shutdown: Arc<AtomicBool>)
where
  U: Upstream + Send + Sync + 'static,
{
  let mut buf = [0; UDP_BUFFER_SIZE];

  while !shutdown.load(Ordering::Relaxed) {
    let (size, src) = match socket.recv_from(&mut buf) {
      Ok((size, src)) => (size, src),
      Err(ref e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
        continue;
      }
      Err(e) => {
        warn!("Error in recv: {}", e);
        continue;
      }
    };

    let request = match accept_request(&buf[..size], src) {
      Some(request) => request,
      None => continue,
    };

    let reply = UdpReply {
      socket: socket.clone(),
      peer: src,
    };
    let proxy = proxy.clone();
    let spawned = thread::Builder::new().spawn(move || {
      // Failures are already logged by the proxy.
      let _ = proxy.handle(&request, reply);
    });
    if let Err(e) = spawned {
      error!("Error spawning handler for {}: {}", src, e);
    }
  }

  debug!("UDP listener stopped");
}

fn run_tcp<U>(listener: TcpListener, proxy: Arc<Proxy<U>>, shutdown: Arc<AtomicBool>)
where
  U: Upstream + Send + Sync + 'static,
{
  while !shutdown.load(Ordering::Relaxed) {
    let (stream, peer) = match listener.accept() {
      Ok(conn) => conn,
      Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
        thread::sleep(POLL_INTERVAL);
        continue;
      }
      Err(e) => {
        warn!("Error in accept: {}", e);
        thread::sleep(POLL_INTERVAL);
        continue;
      }
    };

    let proxy = proxy.clone();
    let spawned = thread::Builder::new().spawn(move || {
      if let Err(e) = serve_connection(&stream, peer, &proxy) {
        debug!("TCP connection from {} closed: {}", peer, e);
      }
      let _ = stream.shutdown(Shutdown::Both);
    });
    if let Err(e) = spawned {
      error!("Error spawning handler for {}: {}", peer, e);
    }
  }

  debug!("TCP listener stopped");
}

/// Serves length-prefixed queries on one connection, in order, until the
/// client closes it or stays idle too long.
fn serve_connection<U: Upstream>(stream: &TcpStream, peer: SocketAddr, proxy: &Proxy<U>) -> io::Result<()> {
  stream.set_nonblocking(false)?;
  stream.set_read_timeout(Some(TCP_IDLE_TIMEOUT))?;

  let mut reader = stream;
  loop {
    let mut len = [0u8; 2];
    match reader.read_exact(&mut len) {
      Ok(()) => (),
      Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
      Err(e) => return Err(e),
    }

    let mut buf = vec![0u8; u16::from_be_bytes(len) as usize];
    reader.read_exact(&mut buf)?;

    let request = match accept_request(&buf, peer) {
      Some(request) => request,
      None => continue,
    };

    if let Err(e) = proxy.handle(&request, TcpReply { stream }) {
      return Err(io::Error::new(io::ErrorKind::Other, e));
    }
  }
}

/// Running listeners. Shutting down stops accepting new requests; requests
/// already being handled finish on their own.
pub struct ServerHandle {
  addr: SocketAddr,
  shutdown: Arc<AtomicBool>,
  listeners: Vec<JoinHandle<()>>,
}

impl ServerHandle {
  pub fn local_addr(&self) -> SocketAddr {
    self.addr
  }

  pub fn shutdown(self) {
    self.shutdown.store(true, Ordering::Relaxed);
    for listener in self.listeners {
      if listener.join().is_err() {
        error!("Listener thread panicked");
      }
    }
  }
}
