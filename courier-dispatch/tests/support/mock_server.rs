//! Scriptable SMTP server for exercising the SMTP mail sender.
//!
//! Replies are configurable per command; the server records every command
//! and the message content so tests can assert on the session.

use std::{
    fmt::Write,
    net::{IpAddr, Ipv4Addr, SocketAddr},
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
    Auth(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    MessageContent(String),
    Quit,
    StartTls,
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SmtpResponse {
    pub code: u16,
    pub message: String,
}

impl SmtpResponse {
    fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.code, self.message).into_bytes()
    }
}

#[derive(Debug, Clone)]
struct MockServerConfig {
    greeting: SmtpResponse,
    capabilities: Vec<String>,
    auth_response: SmtpResponse,
    mail_from_response: SmtpResponse,
    rcpt_to_response: SmtpResponse,
    data_response: SmtpResponse,
    data_end_response: SmtpResponse,
    quit_response: SmtpResponse,
    response_delay: Option<Duration>,
    timeout_on_command: Option<usize>,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            greeting: SmtpResponse::new(220, "Mock SMTP Server"),
            capabilities: vec!["localhost".to_string(), "AUTH PLAIN LOGIN".to_string()],
            auth_response: SmtpResponse::new(235, "Authentication successful"),
            mail_from_response: SmtpResponse::new(250, "OK"),
            rcpt_to_response: SmtpResponse::new(250, "OK"),
            data_response: SmtpResponse::new(354, "Start mail input; end with <CRLF>.<CRLF>"),
            data_end_response: SmtpResponse::new(250, "OK: Message accepted"),
            quit_response: SmtpResponse::new(221, "Bye"),
            response_delay: None,
            timeout_on_command: None,
        }
    }
}

impl MockServerConfig {
    fn ehlo_bytes(&self) -> Vec<u8> {
        let mut response = String::new();
        let last = self.capabilities.len().saturating_sub(1);

        for (i, capability) in self.capabilities.iter().enumerate() {
            let separator = if i < last { '-' } else { ' ' };
            let _ = write!(&mut response, "250{separator}{capability}\r\n");
        }

        response.into_bytes()
    }
}

pub struct MockSmtpServer {
    addr: SocketAddr,
    commands: Arc<RwLock<Vec<SmtpCommand>>>,
    connections: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
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

    /// Content of every message received after DATA
    pub async fn messages(&self) -> Vec<String> {
        self.commands
            .read()
            .await
            .iter()
            .filter_map(|command| match command {
                SmtpCommand::MessageContent(content) => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }

    async fn reply(
        writer: &mut (impl AsyncWriteExt + Unpin),
        config: &MockServerConfig,
        bytes: &[u8],
    ) -> std::io::Result<()> {
        if let Some(delay) = config.response_delay {
            tokio::time::sleep(delay).await;
        }
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    async fn read_line(
        reader: &mut (impl AsyncBufReadExt + Unpin),
        line: &mut String,
    ) -> std::io::Result<bool> {
        line.clear();
        Ok(reader.read_line(line).await? > 0)
    }

    async fn handle_client(
        mut stream: TcpStream,
        config: Arc<MockServerConfig>,
        commands: Arc<RwLock<Vec<SmtpCommand>>>,
    ) -> std::io::Result<()> {
        let (reader, mut writer) = stream.split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        let mut command_index = 0;

        Self::reply(&mut writer, &config, &config.greeting.to_bytes()).await?;

        loop {
            if config.timeout_on_command == Some(command_index) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }

            if !Self::read_line(&mut reader, &mut line).await? {
                return Ok(());
            }
            command_index += 1;

            let command_line = line.trim_end().to_string();
            let (verb, argument) = command_line
                .split_once(' ')
                .unwrap_or((command_line.as_str(), ""));

            match verb.to_ascii_uppercase().as_str() {
                "EHLO" | "HELO" => {
                    commands.write().await.push(SmtpCommand::Ehlo(argument.to_string()));
                    Self::reply(&mut writer, &config, &config.ehlo_bytes()).await?;
                }
                "AUTH" => {
                    commands.write().await.push(SmtpCommand::Auth(argument.to_string()));
                    if argument.eq_ignore_ascii_case("LOGIN") {
                        for prompt in ["VXNlcm5hbWU6", "UGFzc3dvcmQ6"] {
                            Self::reply(&mut writer, &config, &SmtpResponse::new(334, prompt).to_bytes())
                                .await?;
                            if !Self::read_line(&mut reader, &mut line).await? {
                                return Ok(());
                            }
                        }
                    }
                    Self::reply(&mut writer, &config, &config.auth_response.to_bytes()).await?;
                }
                "MAIL" => {
                    commands.write().await.push(SmtpCommand::MailFrom(argument.to_string()));
                    Self::reply(&mut writer, &config, &config.mail_from_response.to_bytes()).await?;
                }
                "RCPT" => {
                    commands.write().await.push(SmtpCommand::RcptTo(argument.to_string()));
                    Self::reply(&mut writer, &config, &config.rcpt_to_response.to_bytes()).await?;
                }
                "DATA" => {
                    commands.write().await.push(SmtpCommand::Data);
                    Self::reply(&mut writer, &config, &config.data_response.to_bytes()).await?;
                    if config.data_response.code != 354 {
                        continue;
                    }

                    let mut content = String::new();
                    loop {
                        if !Self::read_line(&mut reader, &mut line).await? {
                            return Ok(());
                        }
                        if line == ".\r\n" || line == ".\n" {
                            break;
                        }
                        content.push_str(&line);
                    }

                    commands.write().await.push(SmtpCommand::MessageContent(content));
                    Self::reply(&mut writer, &config, &config.data_end_response.to_bytes()).await?;
                }
                "QUIT" => {
                    commands.write().await.push(SmtpCommand::Quit);
                    Self::reply(&mut writer, &config, &config.quit_response.to_bytes()).await?;
                    return Ok(());
                }
                "STARTTLS" => {
                    commands.write().await.push(SmtpCommand::StartTls);
                    Self::reply(
                        &mut writer,
                        &config,
                        &SmtpResponse::new(454, "TLS not available").to_bytes(),
                    )
                    .await?;
                }
                _ => {
                    commands.write().await.push(SmtpCommand::Other(command_line.clone()));
                    Self::reply(
                        &mut writer,
                        &config,
                        &SmtpResponse::new(500, "Unknown command").to_bytes(),
                    )
                    .await?;
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MockSmtpServerBuilder {
    config: MockServerConfig,
    bind: Option<IpAddr>,
}

impl MockSmtpServerBuilder {
    /// Listen on `ip` instead of 127.0.0.1
    #[must_use]
    pub fn bind_to(mut self, ip: IpAddr) -> Self {
        self.bind = Some(ip);
        self
    }

    /// Replace the EHLO capability lines (the first is the greeting line)
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: &[&str]) -> Self {
        self.config.capabilities = capabilities.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn with_auth_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.auth_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_mail_from_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.mail_from_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_rcpt_to_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.rcpt_to_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub fn with_data_end_response(mut self, code: u16, message: impl Into<String>) -> Self {
        self.config.data_end_response = SmtpResponse::new(code, message);
        self
    }

    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Hang on the Nth command (0-indexed)
    #[must_use]
    pub const fn with_timeout_on_command(mut self, command_index: usize) -> Self {
        self.config.timeout_on_command = Some(command_index);
        self
    }

    /// Bind to a random local port and start serving.
    ///
    /// # Errors
    /// If the listener cannot be bound
    pub async fn build(self) -> std::io::Result<MockSmtpServer> {
        let ip = self.bind.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let listener = TcpListener::bind(SocketAddr::new(ip, 0)).await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let commands = Arc::new(RwLock::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let handle = {
            let commands = Arc::clone(&commands);
            let connections = Arc::clone(&connections);

            tokio::spawn(async move {
                while let Ok((stream, _peer)) = listener.accept().await {
                    connections.fetch_add(1, Ordering::SeqCst);
                    let config = Arc::clone(&config);
                    let commands = Arc::clone(&commands);

                    tokio::spawn(async move {
                        if let Err(e) = MockSmtpServer::handle_client(stream, config, commands).await {
                            tracing::debug!("Mock server client error: {e}");
                        }
                    });
                }
            })
        };

        Ok(MockSmtpServer {
            addr,
            commands,
            connections,
            handle,
        })
    }
}
