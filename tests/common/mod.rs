//! In-process mock backends for integration tests

#![allow(dead_code)]

use backend_control::config::BackendConfig;
use backend_control::protocol::{read_frame, write_frame, Frame, MessageType};
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const IDLE: Duration = Duration::from_secs(30);

/// How one mock endpoint answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Acknowledge everything
    Normal,
    /// Answer READY with the wrong message type
    FailReady,
    /// Hang up instead of acknowledging the given command body
    DropOnCommand(String),
    /// Acknowledge the given command body after a delay, ignore later commands
    LateAck(String, Duration),
}

/// A backend made of one listener per endpoint
pub struct MockBackend {
    pub ports: Vec<u16>,
    received: Arc<Mutex<Vec<String>>>,
    accepted: Arc<AtomicUsize>,
    tasks: Vec<JoinHandle<()>>,
}

impl MockBackend {
    pub async fn spawn(behaviors: &[Behavior]) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));
        let mut ports = Vec::new();
        let mut tasks = Vec::new();

        for behavior in behaviors {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            ports.push(listener.local_addr().unwrap().port());

            let behavior = behavior.clone();
            let received = Arc::clone(&received);
            let accepted = Arc::clone(&accepted);
            tasks.push(tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    accepted.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(stream, behavior.clone(), Arc::clone(&received)));
                }
            }));
        }

        Self {
            ports,
            received,
            accepted,
            tasks,
        }
    }

    pub async fn normal(endpoints: usize) -> Self {
        Self::spawn(&vec![Behavior::Normal; endpoints]).await
    }

    pub fn config(&self, name: &str) -> BackendConfig {
        BackendConfig::new(name, "127.0.0.1", self.ports.clone())
    }

    /// Command and event bodies received so far, across all endpoints
    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Connections accepted so far, across all endpoints
    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn serve(mut stream: TcpStream, behavior: Behavior, received: Arc<Mutex<Vec<String>>>) {
    let mut acked_late = false;
    loop {
        let request = match read_frame(&mut stream, IDLE).await {
            Ok(frame) => frame,
            Err(_) => return,
        };

        let reply = match request.message_type() {
            MessageType::Hello => MessageType::HelloAck,
            MessageType::Ready if behavior == Behavior::FailReady => MessageType::HelloAck,
            MessageType::Ready => MessageType::ReadyAck,
            MessageType::Command => {
                let body = request.body_text();
                received.lock().unwrap().push(body.clone());
                match &behavior {
                    Behavior::DropOnCommand(target) if *target == body => return,
                    Behavior::LateAck(_, _) if acked_late => continue,
                    Behavior::LateAck(target, delay) if *target == body => {
                        tokio::time::sleep(*delay).await;
                        acked_late = true;
                    }
                    _ => {}
                }
                MessageType::CommandAck
            }
            MessageType::Event => {
                received
                    .lock()
                    .unwrap()
                    .push(format!("EVENT:{}", request.body_text()));
                MessageType::EventAck
            }
            _ => return,
        };

        let ack = Frame::new(reply, request.header.sequence, Bytes::new());
        if write_frame(&mut stream, &ack, IDLE).await.is_err() {
            return;
        }
    }
}

/// A port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
