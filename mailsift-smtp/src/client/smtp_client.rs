//! One client-side SMTP session over plain TCP or TLS.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use mailsift_common::{incoming, internal, outgoing};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    rustls::{
        ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

use super::{
    error::{ClientError, Result},
    response::Response,
};

const INITIAL_READ_BUFFER: usize = 8 * 1024;

/// Replies longer than this are treated as malformed.
const MAX_REPLY_BYTES: usize = 1024 * 1024;

enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl ClientConnection {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.flush().await?,
            Self::Tls(stream) => stream.flush().await?,
        }
        Ok(())
    }

    async fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if read == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(read)
    }

    async fn upgrade_to_tls(self, domain: &str, accept_invalid_certs: bool) -> Result<Self> {
        match self {
            Self::Plain(stream) => {
                let connector = tls_connector(accept_invalid_certs)?;
                let server_name = ServerName::try_from(domain.to_string())
                    .map_err(|err| ClientError::TlsError(format!("{domain} is not a valid server name: {err}")))?;

                let tls_stream = connector
                    .connect(server_name, stream)
                    .await
                    .map_err(|err| ClientError::TlsError(err.to_string()))?;

                Ok(Self::Tls(Box::new(tls_stream)))
            }
            Self::Tls(_) => Err(ClientError::TlsError("session is already encrypted".to_string())),
        }
    }
}

fn tls_connector(accept_invalid_certs: bool) -> Result<TlsConnector> {
    let mut root_store = RootCertStore::empty();

    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        root_store
            .add(cert)
            .map_err(|err| ClientError::TlsError(format!("unusable native root certificate: {err}")))?;
    }
    if !certs.errors.is_empty() {
        internal!(
            level = WARN,
            ?certs.errors,
            "Skipped native root certificates that failed to load"
        );
    }

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    if accept_invalid_certs {
        config
            .dangerous()
            .set_certificate_verifier(Arc::new(NoVerifier));
    }

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Accepts any server certificate.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ED25519,
        ]
    }
}

/// A single SMTP session.
pub struct SmtpClient {
    connection: Option<ClientConnection>,
    buffer: Vec<u8>,
    buffer_pos: usize,
    server_domain: String,
    accept_invalid_certs: bool,
}

impl SmtpClient {
    /// Opens a plaintext connection to `addr` (`host:port`).
    ///
    /// `server_domain` is the name presented for SNI and certificate checks
    /// if the session is later upgraded with STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(addr: &str, server_domain: impl Into<String>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_connection(
            ClientConnection::Plain(stream),
            server_domain.into(),
        ))
    }

    /// Opens a connection that is TLS from the first byte (SMTPS, port 465).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or the handshake fails.
    pub async fn connect_tls(
        addr: &str,
        server_domain: impl Into<String>,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let server_domain = server_domain.into();
        let stream = TcpStream::connect(addr).await?;
        let connection = ClientConnection::Plain(stream)
            .upgrade_to_tls(&server_domain, accept_invalid_certs)
            .await?;

        Ok(Self::from_connection(connection, server_domain).accept_invalid_certs(accept_invalid_certs))
    }

    fn from_connection(connection: ClientConnection, server_domain: String) -> Self {
        Self {
            connection: Some(connection),
            buffer: vec![0u8; INITIAL_READ_BUFFER],
            buffer_pos: 0,
            server_domain,
            accept_invalid_certs: false,
        }
    }

    /// Sets whether a later STARTTLS accepts invalid certificates.
    #[must_use]
    pub const fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Returns `true` once the session runs over TLS.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.connection, Some(ClientConnection::Tls(_)))
    }

    /// Reads the initial server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the greeting is malformed.
    pub async fn read_greeting(&mut self) -> Result<Response> {
        self.read_response().await
    }

    /// Sends a command line without waiting for the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or the write fails.
    pub async fn send_command(&mut self, command: &str) -> Result<()> {
        outgoing!("{command}");
        self.send_raw(format!("{command}\r\n").as_bytes()).await
    }

    async fn send_raw(&mut self, data: &[u8]) -> Result<()> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(ClientError::ConnectionClosed)?;
        connection.write_all(data).await?;
        connection.flush().await
    }

    /// One command line and its reply, whatever the reply code.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport or parse failures.
    pub async fn command(&mut self, command: &str) -> Result<Response> {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be sent or answered.
    pub async fn ehlo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("EHLO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be sent or answered.
    pub async fn helo(&mut self, domain: &str) -> Result<Response> {
        self.command(&format!("HELO {domain}")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be sent or answered.
    pub async fn mail_from(&mut self, from: &str) -> Result<Response> {
        self.command(&format!("MAIL FROM:<{from}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be sent or answered.
    pub async fn rcpt_to(&mut self, to: &str) -> Result<Response> {
        self.command(&format!("RCPT TO:<{to}>")).await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be sent or answered.
    pub async fn data(&mut self) -> Result<Response> {
        self.command("DATA").await
    }

    /// Sends the message content, dot-stuffed, followed by the end-of-data marker.
    ///
    /// # Errors
    ///
    /// Returns an error if sending or reading the final reply fails.
    pub async fn send_data(&mut self, data: &str) -> Result<Response> {
        let mut payload = String::with_capacity(data.len() + 8);
        for line in data.split_inclusive('\n') {
            if line.starts_with('.') {
                payload.push('.');
            }
            payload.push_str(line);
        }

        if !payload.ends_with("\r\n") {
            if payload.ends_with('\n') {
                payload.pop();
            }
            payload.push_str("\r\n");
        }
        payload.push_str(".\r\n");

        outgoing!("<{} bytes of message data>", payload.len());
        self.send_raw(payload.as_bytes()).await?;
        self.read_response().await
    }

    /// # Errors
    ///
    /// Returns an error if the command cannot be sent or answered.
    pub async fn quit(&mut self) -> Result<Response> {
        self.command("QUIT").await
    }

    /// Sends STARTTLS and, on a 220 reply, upgrades the connection in place.
    ///
    /// Any other reply is returned untouched and the session stays plaintext.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the TLS handshake fails.
    pub async fn starttls(&mut self) -> Result<Response> {
        let response = self.command("STARTTLS").await?;

        if response.code == 220 {
            let old_connection = self
                .connection
                .take()
                .ok_or(ClientError::ConnectionClosed)?;
            self.connection = Some(
                old_connection
                    .upgrade_to_tls(&self.server_domain, self.accept_invalid_certs)
                    .await?,
            );
            // Anything buffered before the handshake belongs to the plaintext session.
            self.buffer_pos = 0;
        }

        Ok(response)
    }

    /// Authenticates with `AUTH PLAIN` (RFC 4616) using an initial response.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SmtpError` unless the server answers 235.
    pub async fn auth_plain(&mut self, username: &str, password: &str) -> Result<Response> {
        let token = STANDARD.encode(format!("\0{username}\0{password}"));
        self.send_raw(format!("AUTH PLAIN {token}\r\n").as_bytes())
            .await?;
        outgoing!("AUTH PLAIN <credentials>");

        self.read_response().await?.expect_code(235)
    }

    /// Authenticates with the `AUTH LOGIN` challenge exchange.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::SmtpError` if any step is refused.
    pub async fn auth_login(&mut self, username: &str, password: &str) -> Result<Response> {
        self.command("AUTH LOGIN").await?.expect_code(334)?;

        self.send_raw(format!("{}\r\n", STANDARD.encode(username)).as_bytes())
            .await?;
        self.read_response().await?.expect_code(334)?;

        self.send_raw(format!("{}\r\n", STANDARD.encode(password)).as_bytes())
            .await?;
        outgoing!("<credentials>");

        self.read_response().await?.expect_code(235)
    }

    /// Reads one complete SMTP reply from the server.
    async fn read_response(&mut self) -> Result<Response> {
        loop {
            if let Some((response, consumed)) =
                Response::parse_response(&self.buffer[..self.buffer_pos])?
            {
                self.buffer.copy_within(consumed..self.buffer_pos, 0);
                self.buffer_pos -= consumed;

                incoming!("{} {}", response.code, response.message());
                return Ok(response);
            }

            if self.buffer_pos >= self.buffer.len() {
                let new_size = self.buffer.len() * 2;
                if new_size > MAX_REPLY_BYTES {
                    return Err(ClientError::ParseError(format!(
                        "reply exceeds {MAX_REPLY_BYTES} bytes"
                    )));
                }
                self.buffer.resize(new_size, 0);
            }

            let connection = self
                .connection
                .as_mut()
                .ok_or(ClientError::ConnectionClosed)?;
            let read = connection.read_some(&mut self.buffer[self.buffer_pos..]).await?;
            self.buffer_pos += read;
        }
    }
}
