//! QEMU machine protocol (QMP) backend
//!
//! QMP is newline-delimited JSON over a unix socket. A session starts with a
//! greeting from QEMU, then capability negotiation, then any number of
//! `execute` commands. Replies are either `{"return": ...}` or
//! `{"error": {...}}`; asynchronous `{"event": ...}` messages may be
//! interleaved at any point and are skipped here.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{hmp, Introspector, RegisterSnapshot, Result};
use crate::domain::{GuestPhysAddr, GuestVirtAddr, IntrospectionError, VcpuId};
use crate::symbolization::SymbolResolver;

/// Upper bound on a single QMP round trip
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct Command<'a> {
    execute: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    arguments: Option<Value>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum Message {
    Return {
        #[serde(rename = "return")]
        value: Value,
    },
    Error {
        error: ErrorBody,
    },
    Event {
        event: String,
    },
    Greeting {
        #[serde(rename = "QMP")]
        qmp: Value,
    },
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    class: String,
    desc: String,
}

#[derive(Deserialize)]
struct NameInfo {
    name: Option<String>,
}

#[derive(Deserialize)]
struct StatusInfo {
    running: bool,
    status: String,
}

/// A negotiated QMP session
pub struct QmpClient {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl QmpClient {
    /// Connect to a QMP socket and leave capabilities-negotiation mode
    ///
    /// # Errors
    /// Returns an error if the socket cannot be opened, the peer does not
    /// greet with a QMP banner, or `qmp_capabilities` is rejected.
    pub fn connect<P: AsRef<Path>>(path: P) -> Result<Self> {
        let stream = UnixStream::connect(path.as_ref())?;
        stream.set_read_timeout(Some(REPLY_TIMEOUT))?;
        let writer = stream.try_clone()?;
        let mut client = Self { reader: BufReader::new(stream), writer };

        match client.read_message()? {
            Message::Greeting { qmp } => {
                let version = &qmp["version"]["qemu"];
                info!(
                    "QMP greeting from QEMU {}.{}.{}",
                    version["major"], version["minor"], version["micro"]
                );
            }
            other => {
                return Err(IntrospectionError::UnexpectedReply {
                    command: "<greeting>".to_string(),
                    reply: format!("{other:?}"),
                });
            }
        }

        client.execute("qmp_capabilities", None)?;
        Ok(client)
    }

    /// Run a QMP command and return its `return` payload
    ///
    /// # Errors
    /// Returns [`IntrospectionError::Command`] when QEMU answers with an
    /// error object, or a transport/protocol error.
    pub fn execute(&mut self, command: &str, arguments: Option<Value>) -> Result<Value> {
        let mut line = serde_json::to_vec(&Command { execute: command, arguments })?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;

        loop {
            match self.read_message()? {
                Message::Return { value } => return Ok(value),
                Message::Error { error } => {
                    return Err(IntrospectionError::Command {
                        command: command.to_string(),
                        class: error.class,
                        desc: error.desc,
                    });
                }
                Message::Event { event } => debug!("QMP event while waiting for {command}: {event}"),
                Message::Greeting { .. } => {
                    return Err(IntrospectionError::UnexpectedReply {
                        command: command.to_string(),
                        reply: "greeting".to_string(),
                    });
                }
            }
        }
    }

    /// Run a human-monitor command, optionally on a specific vCPU
    ///
    /// # Errors
    /// Same as [`execute`](Self::execute); also fails if the reply is not a
    /// string.
    pub fn human_monitor_command(&mut self, line: &str, cpu_index: Option<VcpuId>) -> Result<String> {
        let mut arguments = json!({ "command-line": line });
        if let Some(VcpuId(index)) = cpu_index {
            arguments["cpu-index"] = json!(index);
        }

        match self.execute("human-monitor-command", Some(arguments))? {
            Value::String(text) => Ok(text),
            other => Err(IntrospectionError::UnexpectedReply {
                command: line.to_string(),
                reply: other.to_string(),
            }),
        }
    }

    fn read_message(&mut self) -> Result<Message> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(std::io::Error::new(ErrorKind::UnexpectedEof, "QMP socket closed").into());
            }
            if !line.trim().is_empty() {
                return Ok(serde_json::from_str(&line)?);
            }
        }
    }
}

/// A QEMU guest sampled through QMP
pub struct QemuMachine {
    client: QmpClient,
    vcpu: VcpuId,
    symbols: Option<Box<dyn SymbolResolver>>,
}

impl QemuMachine {
    /// `vcpu` selects whose page tables back virtual reads and translations
    #[must_use]
    pub fn new(client: QmpClient, vcpu: VcpuId) -> Self {
        Self { client, vcpu, symbols: None }
    }

    #[must_use]
    pub fn with_symbols(mut self, symbols: Box<dyn SymbolResolver>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    /// Guest name as configured with `-name`, if any
    ///
    /// # Errors
    /// Returns an error if `query-name` fails or answers with an unexpected shape.
    pub fn guest_name(&mut self) -> Result<Option<String>> {
        let value = self.client.execute("query-name", None)?;
        let info: NameInfo = serde_json::from_value(value)?;
        Ok(info.name)
    }

    /// Whether the guest's vCPUs are currently executing
    ///
    /// # Errors
    /// Returns an error if `query-status` fails.
    pub fn is_running(&mut self) -> Result<bool> {
        let value = self.client.execute("query-status", None)?;
        let info: StatusInfo = serde_json::from_value(value)?;
        debug!("guest status: {}", info.status);
        Ok(info.running)
    }

    fn hmp(&mut self, line: &str) -> Result<String> {
        self.client.human_monitor_command(line, Some(self.vcpu))
    }
}

impl Introspector for QemuMachine {
    fn get_registers(&mut self, vcpu: VcpuId) -> Result<RegisterSnapshot> {
        let text = self.client.human_monitor_command(hmp::INFO_REGISTERS, Some(vcpu))?;
        hmp::parse_registers(vcpu, &text)
    }

    fn translate_virtual_to_physical(&mut self, addr: GuestVirtAddr) -> Result<GuestPhysAddr> {
        let text = self.hmp(&hmp::translate_command(addr))?;
        hmp::parse_translation(&text).ok_or(IntrospectionError::Unmapped(addr))
    }

    fn read_u64_virtual(&mut self, addr: GuestVirtAddr) -> Result<u64> {
        let text = self.hmp(&hmp::read_virtual_command(addr))?;
        hmp::parse_memory_word(&text).ok_or(IntrospectionError::UnreadableVirtual(addr))
    }

    fn read_u64_physical(&mut self, addr: GuestPhysAddr) -> Result<u64> {
        let text = self.hmp(&hmp::read_physical_command(addr))?;
        hmp::parse_memory_word(&text).ok_or(IntrospectionError::UnreadablePhysical(addr))
    }

    fn resolve_symbol(&mut self, addr: GuestVirtAddr) -> Result<Option<String>> {
        Ok(self.symbols.as_ref().and_then(|symbols| symbols.resolve(addr.0)))
    }

    fn pause(&mut self) -> Result<()> {
        self.client.execute("stop", None).map(drop)
    }

    fn resume(&mut self) -> Result<()> {
        self.client.execute("cont", None).map(drop)
    }
}
