use std::io::{BufRead, Read, Write};

use bufstream::BufStream;
use log::trace;

use crate::error::{Error, Result, TransportError, TransportErrorKind};

const CR: u8 = 0x0d;
const LF: u8 = 0x0a;

/// A message as listed by `UIDL`, or by `STAT` on servers without `UIDL`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listing {
    /// Message number, valid for this session only.
    pub number: u32,
    /// The server's unique id for the message, if the server supports `UIDL`.
    pub uid: Option<String>,
}

/// A minimal POP3 ([RFC 1939](https://tools.ietf.org/html/rfc1939)) client.
///
/// Deletions requested with [`dele`](Self::dele) only take effect when the session ends with
/// [`quit`](Self::quit). Dropping the client without quitting leaves the mailbox untouched.
pub struct Pop3Client<T: Read + Write> {
    stream: BufStream<T>,
}

impl<T: Read + Write> Pop3Client<T> {
    /// Wrap a connected stream. The greeting has not been read yet.
    pub fn new(stream: T) -> Self {
        Pop3Client {
            stream: BufStream::new(stream),
        }
    }

    /// The underlying stream.
    pub fn get_ref(&self) -> &T {
        self.stream.get_ref()
    }

    /// Read the server's `+OK` greeting.
    pub fn read_greeting(&mut self) -> Result<()> {
        self.read_status()?;
        Ok(())
    }

    /// Authenticate with `USER` and `PASS`.
    pub fn login(&mut self, user: &str, password: &str) -> Result<()> {
        self.run_command(&format!("USER {}", user))?;
        self.run_command(&format!("PASS {}", password))?;
        Ok(())
    }

    /// `STAT`: the number of messages and their total size in octets.
    pub fn stat(&mut self) -> Result<(u32, u64)> {
        let status = self.run_command("STAT")?;
        let mut parts = status.split_whitespace();
        match (
            parts.next().and_then(|n| n.parse().ok()),
            parts.next().and_then(|n| n.parse().ok()),
        ) {
            (Some(count), Some(size)) => Ok((count, size)),
            _ => Err(malformed(&status)),
        }
    }

    /// List the messages in the maildrop, lowest number first.
    ///
    /// Uses `UIDL` and falls back to `STAT` when the server does not support it.
    pub fn list(&mut self) -> Result<Vec<Listing>> {
        match self.run_command("UIDL") {
            Ok(_) => {}
            Err(Error::Pop3(reason)) => {
                trace!("UIDL unsupported ({}), numbering from STAT", reason);
                let (count, _) = self.stat()?;
                return Ok((1..=count).map(|number| Listing { number, uid: None }).collect());
            }
            Err(e) => return Err(e),
        }
        let body = self.read_multiline()?;
        let text = String::from_utf8_lossy(&body);
        let mut listings = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let mut parts = line.split_whitespace();
            let number = parts
                .next()
                .and_then(|n| n.parse().ok())
                .ok_or_else(|| malformed(line))?;
            listings.push(Listing {
                number,
                uid: parts.next().map(str::to_string),
            });
        }
        listings.sort_by_key(|l| l.number);
        Ok(listings)
    }

    /// `RETR`: the full message, with dot-stuffing removed.
    pub fn retr(&mut self, number: u32) -> Result<Vec<u8>> {
        self.run_command(&format!("RETR {}", number))?;
        self.read_multiline()
    }

    /// `DELE`: mark a message for deletion at the end of the session.
    pub fn dele(&mut self, number: u32) -> Result<()> {
        self.run_command(&format!("DELE {}", number))?;
        Ok(())
    }

    /// `RSET`: unmark everything marked for deletion in this session.
    pub fn rset(&mut self) -> Result<()> {
        self.run_command("RSET")?;
        Ok(())
    }

    /// `QUIT`: end the session, committing deletions.
    pub fn quit(&mut self) -> Result<()> {
        self.run_command("QUIT")?;
        Ok(())
    }

    /// Send a command and return the text after its `+OK`.
    pub fn run_command(&mut self, command: &str) -> Result<String> {
        self.write_line(command.as_bytes())?;
        self.read_status()
    }

    fn read_status(&mut self) -> Result<String> {
        let mut line = Vec::new();
        self.readline(&mut line)?;
        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end();
        if let Some(rest) = line.strip_prefix("+OK") {
            Ok(rest.trim().to_string())
        } else if let Some(rest) = line.strip_prefix("-ERR") {
            Err(Error::Pop3(rest.trim().to_string()))
        } else {
            Err(malformed(line))
        }
    }

    fn read_multiline(&mut self) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        loop {
            let mut line = Vec::new();
            self.readline(&mut line)?;
            if line == b".\r\n" || line == b".\n" {
                return Ok(data);
            }
            // a leading dot is doubled on the wire
            let start = usize::from(line.starts_with(b".."));
            data.extend_from_slice(&line[start..]);
        }
    }

    fn readline(&mut self, into: &mut Vec<u8>) -> Result<usize> {
        let read = self.stream.read_until(LF, into)?;
        if read == 0 {
            return Err(Error::Transport(TransportError::new(
                TransportErrorKind::ConnectionAborted,
                "connection closed by server",
            )));
        }
        trace!("S: {}", String::from_utf8_lossy(into).trim_end());
        Ok(read)
    }

    fn write_line(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        self.stream.write_all(&[CR, LF])?;
        self.stream.flush()?;
        if buf.starts_with(b"PASS ") {
            trace!("C: PASS ***");
        } else {
            trace!("C: {}", String::from_utf8_lossy(buf));
        }
        Ok(())
    }
}

fn malformed(line: &str) -> Error {
    Error::Transport(TransportError::new(
        TransportErrorKind::Parse,
        format!("malformed POP3 response: {:?}", line),
    ))
}
