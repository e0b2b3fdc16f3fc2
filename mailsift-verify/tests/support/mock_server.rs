//! Scriptable SMTP exchanger for probe tests.
//!
//! Every connection is served from the same script. Commands are recorded in
//! arrival order across all connections, so tests can assert exactly what a
//! client sent (and what it did not send).
//!
//! ```rust,no_run
//! # async fn example() -> std::io::Result<()> {
//! let server = MockSmtpServer::builder()
//!     .with_rcpt_to_response(250, "OK")
//!     .with_recipient_response("ghost@example.com", 550, "No such user")
//!     .build()
//!     .await?;
//!
//! // point the client at server.addr()
//! assert_eq!(server.connection_count(), 0);
//! # Ok(())
//! # }
//! ```
#![allow(dead_code)]

use std::{
    collections::HashMap,
    fmt::Write,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    task::JoinHandle,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpCommand {
    Ehlo(String),
    Helo(String),
    StartTls,
    MailFrom(String),
    RcptTo(String),
    Data,
    MessageContent(String),
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![message.into()],
        }
    }

    fn render(&self) -> Vec<u8> {
        let mut out = String::new();
        let last = self.lines.len().saturating_sub(1);
        for (i, line) in self.lines.iter().enumerate() {
            let separator = if i == last { ' ' } else { '-' };
            let _ = write!(out, "{}{separator}{line}\r\n", self.code);
        }
        out.into_bytes()
    }
}

#[derive(Clone)]
struct Script {
    greeting: Reply,
    ehlo: Reply,
    helo: Reply,
    starttls: Reply,
    mail_from: Reply,
    rcpt_to: Reply,
    recipients: HashMap<String, Reply>,
    data: Reply,
    data_end: Reply,
    quit: Reply,

    response_delay: Option<Duration>,
    drop_after_commands: Option<usize>,
    hang_on_command: Option<usize>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            greeting: Reply::new(220, "mock.test ESMTP ready"),
            ehlo: Reply {
                code: 250,
                lines: vec!["mock.test".to_string(), "PIPELINING".to_string()],
            },
            helo: Reply::new(250, "mock.test"),
            // Not advertised, so refused unless a test says otherwise.
            starttls: Reply::new(502, "Command not implemented"),
            mail_from: Reply::new(250, "OK"),
            rcpt_to: Reply::new(250, "OK"),
            recipients: HashMap::new(),
            data: Reply::new(354, "End data with <CR><LF>.<CR><LF>"),
            data_end: Reply::new(250, "OK: queued"),
            quit: Reply::new(221, "Bye"),
            response_delay: None,
            drop_after_commands: None,
            hang_on_command: None,
        }
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
    connections: Arc<AtomicUsize>,
    acceptor: JoinHandle<()>,
}

impl MockSmtpServer {
    #[must_use]
    pub fn builder() -> MockSmtpServerBuilder {
        MockSmtpServerBuilder::default()
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// `127.0.0.1:<port>`, in the form MX overrides expect.
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.read().await.clone()
    }

    /// Recipients seen across every connection.
    pub async fn recipients(&self) -> Vec<String> {
        self.commands
            .read()
            .await
            .iter()
            .filter_map(|command| match command {
                SmtpCommand::RcptTo(address) => Some(address.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of sessions accepted so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    async fn serve(
        mut stream: TcpStream,
        script: Arc<Script>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut handled = 0;

        writer.write_all(&script.greeting.render()).await?;
        if script.greeting.code != 220 {
            return Ok(());
        }

        loop {
            if script.drop_after_commands.is_some_and(|limit| handled >= limit) {
                return Ok(());
            }
            if script.hang_on_command == Some(handled) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            handled += 1;

            let text = line.trim_end();
            let (verb, argument) = text.split_once(' ').unwrap_or((text, ""));

            let (command, reply) = match verb.to_ascii_uppercase().as_str() {
                "EHLO" => (SmtpCommand::Ehlo(argument.to_string()), script.ehlo.clone()),
                "HELO" => (SmtpCommand::Helo(argument.to_string()), script.helo.clone()),
                "STARTTLS" => (SmtpCommand::StartTls, script.starttls.clone()),
                "MAIL" => (
                    SmtpCommand::MailFrom(angle_path(argument)),
                    script.mail_from.clone(),
                ),
                "RCPT" => {
                    let address = angle_path(argument);
                    let reply = script
                        .recipients
                        .get(&address.to_ascii_lowercase())
                        .unwrap_or(&script.rcpt_to)
                        .clone();
                    (SmtpCommand::RcptTo(address), reply)
                }
                "DATA" => (SmtpCommand::Data, script.data.clone()),
                "QUIT" => (SmtpCommand::Quit, script.quit.clone()),
                _ => (
                    SmtpCommand::Other(text.to_string()),
                    Reply::new(500, "Unrecognised command"),
                ),
            };

            let is_data = command == SmtpCommand::Data;
            let is_quit = command == SmtpCommand::Quit;
            let is_upgrade = command == SmtpCommand::StartTls && reply.code == 220;
            commands.write().await.push(command);

            if let Some(delay) = script.response_delay {
                tokio::time::sleep(delay).await;
            }
            writer.write_all(&reply.render()).await?;

            // No TLS here: closing after 220 fails the client's handshake.
            if is_quit || is_upgrade {
                return Ok(());
            }

            if is_data && reply.code == 354 {
                let mut content = String::new();
                loop {
                    line.clear();
                    if reader.read_line(&mut line).await? == 0 {
                        return Ok(());
                    }
                    if line == ".\r\n" {
                        break;
                    }
                    content.push_str(&line);
                }
                commands.write().await.push(SmtpCommand::MessageContent(content));
                writer.write_all(&script.data_end.render()).await?;
            }
        }
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

/// `TO:<user@example.com>` becomes `user@example.com`.
fn angle_path(argument: &str) -> String {
    argument
        .split_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map_or_else(|| argument.to_string(), |(path, _)| path.to_string())
}

#[derive(Default)]
pub struct MockSmtpServerBuilder {
    script: Script,
}

impl MockSmtpServerBuilder {
    #[must_use]
    pub fn with_greeting(mut self, code: u16, message: impl Into<String>) -> Self {
        self.script.greeting = Reply::new(code, message);
        self
    }

    /// EHLO reply lines; the first is the server name, the rest capabilities.
    #[must_use]
    pub fn with_ehlo_lines(mut self, lines: &[&str]) -> Self {
        self.script.ehlo = Reply {
            code: 250,
            lines: lines.iter().map(ToString::to_string).collect(),
        };
        self
    }

    /// Advertises STARTTLS and answers it with the given reply.
    #[must_use]
    pub fn with_starttls(mut self, code: u16, message: impl Into<String>) -> Self {
        self.script.ehlo.lines.push("STARTTLS".to_string());
        self.script.starttls = Reply::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.script.mail_from = Reply::new(code, message);
        self
    }

    /// Default reply for every recipient.
    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.script.rcpt_to = Reply::new(code, message);
        self
    }

    /// Reply for one recipient, overriding the default.
    #[must_use]
    pub fn with_recipient_response(
        mut self,
        address: &str,
        code: u16,
        message: impl Into<String>,
    ) -> Self {
        self.script
            .recipients
            .insert(address.to_ascii_lowercase(), Reply::new(code, message));
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.script.data_end = Reply::new(code, message);
        self
    }

    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.script.response_delay = Some(delay);
        self
    }

    /// Closes the connection after `count` commands.
    #[must_use]
    pub const fn with_drop_after_commands(mut self, count: usize) -> Self {
        self.script.drop_after_commands = Some(count);
        self
    }

    /// Stops answering before the command at `index` (0-based).
    #[must_use]
    pub const fn with_hang_on_command(mut self, index: usize) -> Self {
        self.script.hang_on_command = Some(index);
        self
    }

    /// # Errors
    ///
    /// Returns an error if no local port can be bound.
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let script = Arc::new(self.script);
        let commands: Arc<RwLock<Vec<SmtpCommand>>> = Arc::default();
        let connections = Arc::new(AtomicUsize::new(0));

        let acceptor = {
            let commands = Arc::clone(&commands);
            let connections = Arc::clone(&connections);

            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let script = Arc::clone(&script);
                    let commands = Arc::clone(&commands);
                    tokio::spawn(async move {
                        let _ = MockSmtpServer::serve(stream, script, commands).await;
                    });
                }
            })
        };

        Ok(MockSmtpServer {
            addr,
            commands,
            connections,
            acceptor,
        })
    }
}
