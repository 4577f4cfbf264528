//! Scripted fake printer for control-session tests.
#![allow(dead_code)]

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const LOGIN_LINE: &str = "~M601 S1";
pub const LOGOUT_LINE: &str = "~M602";

/// How the fake printer answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Behavior {
    /// Answers everything like real firmware.
    Cooperative,
    /// Never answers the login frame.
    SilentLogin,
    /// Never answers the logout frame.
    IgnoreLogout,
    /// Replies with an error line to the k-th command (1-based).
    ErrorOn(usize),
    /// Never answers the k-th command.
    StallOn(usize),
    /// Closes the connection on receiving the k-th command.
    DropOn(usize),
    /// Splits every acknowledgment across two writes.
    Fragmented,
}

/// Accept one connection and answer per `behavior`.
///
/// The handle resolves to every line the client sent, once the client hangs up.
pub async fn spawn_device(behavior: Behavior) -> (u16, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        let mut received = Vec::new();
        let mut commands_seen = 0;

        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim_end_matches('\r').to_string();
            received.push(line.clone());

            let reply = match line.as_str() {
                LOGIN_LINE if behavior == Behavior::SilentLogin => None,
                LOGIN_LINE => Some("CMD M601 Received.\r\nControl Success V2.1.\r\nok\r\n".to_string()),
                LOGOUT_LINE if behavior == Behavior::IgnoreLogout => None,
                LOGOUT_LINE => Some("CMD M602 Received.\r\nControl Release.\r\nok\r\n".to_string()),
                other => {
                    commands_seen += 1;
                    let text = other.trim_start_matches('~').to_string();
                    match behavior {
                        Behavior::ErrorOn(k) if k == commands_seen => {
                            Some("Error: command failed\r\n".to_string())
                        }
                        Behavior::StallOn(k) if k == commands_seen => None,
                        Behavior::DropOn(k) if k == commands_seen => break,
                        Behavior::Fragmented => {
                            let (head, tail) = text.split_at(1);
                            if writer.write_all(format!("CMD {}", head).as_bytes()).await.is_err() {
                                break;
                            }
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Some(format!("{} Received.\r\nok\r\n", tail))
                        }
                        _ => Some(format!("CMD {} Received.\r\nok\r\n", text)),
                    }
                }
            };

            if let Some(reply) = reply {
                if writer.write_all(reply.as_bytes()).await.is_err() {
                    break;
                }
            }
        }
        received
    });
    (port, handle)
}

/// Frames as the fake printer logs them, without the line ending.
pub fn sent_lines(commands: &[&str]) -> Vec<String> {
    commands.iter().map(|c| format!("~{}", c)).collect()
}
