//! Scripted submission server for transport tests.
//!
//! Every connection follows the same script and every command is recorded,
//! across connections, in arrival order.
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
    StartTls,
    Auth(String),
    /// A bare line answering an AUTH LOGIN prompt.
    AuthLine(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    MessageContent(String),
    Quit,
    Other(String),
}

#[derive(Debug, Clone)]
struct Reply {
    code: u16,
    lines: Vec<String>,
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
    ehlo: Reply,
    starttls: Reply,
    auth: Reply,
    recipients: HashMap<String, Reply>,
    hang_on_command: Option<usize>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            ehlo: Reply {
                code: 250,
                lines: vec![
                    "submit.test".to_string(),
                    "AUTH PLAIN LOGIN".to_string(),
                    "8BITMIME".to_string(),
                ],
            },
            starttls: Reply::new(502, "Command not implemented"),
            auth: Reply::new(235, "Authentication successful"),
            recipients: HashMap::new(),
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

    pub async fn commands(&self) -> Vec<SmtpCommand> {
        self.commands.read().await.clone()
    }

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
        let mut login_prompts = 0_u8;

        writer
            .write_all(&Reply::new(220, "submit.test ESMTP ready").render())
            .await?;

        for handled in 0.. {
            if script.hang_on_command == Some(handled) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let text = line.trim_end();
            let (verb, argument) = text.split_once(' ').unwrap_or((text, ""));

            let (command, reply) = if login_prompts > 0 {
                login_prompts -= 1;
                let reply = if login_prompts > 0 {
                    Reply::new(334, "UGFzc3dvcmQ6")
                } else {
                    script.auth.clone()
                };
                (SmtpCommand::AuthLine(text.to_string()), reply)
            } else {
                match verb.to_ascii_uppercase().as_str() {
                    "EHLO" => (SmtpCommand::Ehlo(argument.to_string()), script.ehlo.clone()),
                    "STARTTLS" => (SmtpCommand::StartTls, script.starttls.clone()),
                    "AUTH" if argument.eq_ignore_ascii_case("LOGIN") => {
                        login_prompts = 2;
                        (
                            SmtpCommand::Auth(argument.to_string()),
                            Reply::new(334, "VXNlcm5hbWU6"),
                        )
                    }
                    "AUTH" => (SmtpCommand::Auth(argument.to_string()), script.auth.clone()),
                    "MAIL" => (
                        SmtpCommand::MailFrom(angle_path(argument)),
                        Reply::new(250, "OK"),
                    ),
                    "RCPT" => {
                        let address = angle_path(argument);
                        let reply = script
                            .recipients
                            .get(&address.to_ascii_lowercase())
                            .cloned()
                            .unwrap_or_else(|| Reply::new(250, "OK"));
                        (SmtpCommand::RcptTo(address), reply)
                    }
                    "DATA" => (
                        SmtpCommand::Data,
                        Reply::new(354, "End data with <CR><LF>.<CR><LF>"),
                    ),
                    "QUIT" => (SmtpCommand::Quit, Reply::new(221, "Bye")),
                    _ => (
                        SmtpCommand::Other(text.to_string()),
                        Reply::new(500, "Unrecognised command"),
                    ),
                }
            };

            let closes = command == SmtpCommand::Quit
                || (command == SmtpCommand::StartTls && reply.code == 220);
            let is_data = command == SmtpCommand::Data;
            commands.write().await.push(command);
            writer.write_all(&reply.render()).await?;

            // Plaintext only, so an accepted STARTTLS ends the session too.
            if closes {
                return Ok(());
            }

            if is_data {
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
                writer.write_all(&Reply::new(250, "OK: queued").render()).await?;
            }
        }

        Ok(())
    }
}

impl Drop for MockSmtpServer {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

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
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.script.auth = Reply::new(code, message);
        self
    }

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
