// Copyright 2024 svcdash Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! TCP port liveness: listener enumeration plus a loopback dial

use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

use crate::CommandRunner;

/// Where bound listeners are enumerated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerSource {
    /// `ss -tuln`
    Ss,
    /// `netstat -an -p TCP`, LISTENING rows only
    Netstat,
    /// No enumeration, dial only
    None,
}

impl ListenerSource {
    fn command(&self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            ListenerSource::Ss => Some(("ss", &["-tuln"])),
            ListenerSource::Netstat => Some(("netstat", &["-an", "-p", "TCP"])),
            ListenerSource::None => None,
        }
    }

    /// Whether `listing` shows a listener on `port`
    pub fn lists_port(&self, listing: &str, port: u16) -> bool {
        let suffix = format!(":{}", port);
        listing
            .lines()
            .filter(|line| match self {
                ListenerSource::Netstat => line.contains("LISTENING"),
                _ => true,
            })
            .any(|line| line.split_whitespace().any(|token| token.ends_with(&suffix)))
    }
}

/// Port check: listener enumeration first, loopback dial second.
///
/// Enumeration can be missing or restricted, so either check succeeding is
/// enough.
pub async fn probe_port(
    runner: &CommandRunner,
    source: ListenerSource,
    port: u16,
    dial_timeout: Duration,
) -> bool {
    if port == 0 {
        return false;
    }
    if listener_bound(runner, source, port).await {
        return true;
    }
    dial_loopback(port, dial_timeout).await
}

async fn listener_bound(runner: &CommandRunner, source: ListenerSource, port: u16) -> bool {
    let Some((program, args)) = source.command() else {
        return false;
    };
    match runner.stdout(program, args).await {
        Ok(listing) => source.lists_port(&listing, port),
        Err(e) => {
            debug!("Listener enumeration unavailable: {}", e);
            false
        }
    }
}

/// TCP connect to `127.0.0.1:port` within `timeout`
pub async fn dial_loopback(port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((Ipv4Addr::LOCALHOST, port))).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const SS_OUTPUT: &str = "\
Netid State  Recv-Q Send-Q Local Address:Port  Peer Address:Port Process
udp   UNCONN 0      0            0.0.0.0:5353       0.0.0.0:*
tcp   LISTEN 0      4096   127.0.0.53%lo:53         0.0.0.0:*
tcp   LISTEN 0      128          0.0.0.0:22         0.0.0.0:*
tcp   LISTEN 0      511             [::]:8080          [::]:*
";

    const NETSTAT_OUTPUT: &str = "\
Active Connections

  Proto  Local Address          Foreign Address        State
  TCP    0.0.0.0:135            0.0.0.0:0              LISTENING
  TCP    0.0.0.0:3389           0.0.0.0:0              LISTENING
  TCP    192.168.1.5:51000      140.82.112.4:443       ESTABLISHED
";

    #[test]
    fn test_ss_listing() {
        assert!(ListenerSource::Ss.lists_port(SS_OUTPUT, 22));
        assert!(ListenerSource::Ss.lists_port(SS_OUTPUT, 8080));
        assert!(ListenerSource::Ss.lists_port(SS_OUTPUT, 53));
        assert!(!ListenerSource::Ss.lists_port(SS_OUTPUT, 2));
        assert!(!ListenerSource::Ss.lists_port(SS_OUTPUT, 80));
    }

    #[test]
    fn test_netstat_listing_ignores_connections() {
        assert!(ListenerSource::Netstat.lists_port(NETSTAT_OUTPUT, 3389));
        assert!(!ListenerSource::Netstat.lists_port(NETSTAT_OUTPUT, 443));
        assert!(!ListenerSource::Netstat.lists_port(NETSTAT_OUTPUT, 51000));
    }

    #[tokio::test]
    async fn test_toggling_listener_flips_probe() {
        let runner = CommandRunner::new(Duration::from_secs(2));
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(probe_port(&runner, ListenerSource::None, port, Duration::from_millis(200)).await);

        drop(listener);
        assert!(!probe_port(&runner, ListenerSource::None, port, Duration::from_millis(200)).await);
    }

    #[tokio::test]
    async fn test_port_zero_is_never_active() {
        let runner = CommandRunner::new(Duration::from_secs(2));
        assert!(!probe_port(&runner, ListenerSource::Ss, 0, Duration::from_millis(50)).await);
    }
}
