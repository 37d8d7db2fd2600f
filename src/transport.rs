//! UDP push channels per source: label, mask and (optionally) preview.
//!
//! Label datagram: raw UTF-8 label name, no header.
//! Mask datagram: `b"MASK"` + u32 big-endian length + JPEG bytes.
//! No handshake, acknowledgment, retry or sequence numbers.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use anyhow::{bail, Context, Result};

use crate::pose::PoseLabel;

/// IPv4 UDP の最大ペイロード
pub const MAX_DATAGRAM: usize = 65507;

pub const MASK_TAG: &[u8; 4] = b"MASK";
pub const MASK_HEADER_LEN: usize = 8;

/// 送信先 (source index ごとに固定)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceEndpoints {
    pub label: SocketAddr,
    pub mask: SocketAddr,
    pub preview: Option<SocketAddr>,
}

impl SourceEndpoints {
    /// label = base + i, mask = base + i + mask_offset, preview = base + i + preview_offset
    pub fn for_index(
        host: &str,
        base_port: u16,
        index: usize,
        mask_offset: u16,
        preview_offset: Option<u16>,
    ) -> Result<Self> {
        let port = |offset: u16| -> Result<u16> {
            let p = base_port as usize + index + offset as usize;
            u16::try_from(p).with_context(|| format!("port {} out of range for source {}", p, index))
        };
        let label_port = port(0)?;
        let mask_port = port(mask_offset)?;
        let preview_port = preview_offset.map(port).transpose()?;

        Ok(Self {
            label: resolve(host, label_port)?,
            mask: resolve(host, mask_port)?,
            preview: preview_port.map(|p| resolve(host, p)).transpose()?,
        })
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("failed to resolve {}:{}", host, port))?
        .next()
        .with_context(|| format!("no address for {}:{}", host, port))
}

/// 送信結果。ドロップはエラーではない
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent(usize),
    Oversized(usize),
}

/// `MASK` + length + payload
pub fn frame_mask_datagram(payload: &[u8]) -> Vec<u8> {
    let mut datagram = Vec::with_capacity(MASK_HEADER_LEN + payload.len());
    datagram.extend_from_slice(MASK_TAG);
    datagram.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    datagram.extend_from_slice(payload);
    datagram
}

/// Receiver-side check of a mask datagram; returns the JPEG payload.
pub fn parse_mask_datagram(datagram: &[u8]) -> Result<&[u8]> {
    if datagram.len() < MASK_HEADER_LEN {
        bail!("mask datagram too short: {} bytes", datagram.len());
    }
    if &datagram[..4] != MASK_TAG {
        bail!("bad mask tag {:?}", &datagram[..4]);
    }
    let len = u32::from_be_bytes([datagram[4], datagram[5], datagram[6], datagram[7]]) as usize;
    let payload = &datagram[MASK_HEADER_LEN..];
    if payload.len() != len {
        bail!("mask length field {} but payload is {} bytes", len, payload.len());
    }
    Ok(payload)
}

/// 1ソース分の送信ソケット
pub struct Transport {
    socket: UdpSocket,
    endpoints: SourceEndpoints,
}

impl Transport {
    pub fn new(endpoints: SourceEndpoints) -> Result<Self> {
        let bind = if endpoints.label.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind).context("failed to bind UDP socket")?;
        Ok(Self { socket, endpoints })
    }

    pub fn endpoints(&self) -> &SourceEndpoints {
        &self.endpoints
    }

    pub fn send_label(&self, label: PoseLabel) -> Result<SendOutcome> {
        self.send_label_str(label.as_str())
    }

    pub fn send_label_str(&self, label: &str) -> Result<SendOutcome> {
        self.send_bounded(label.as_bytes(), self.endpoints.label)
    }

    pub fn send_mask(&self, jpeg: &[u8]) -> Result<SendOutcome> {
        if jpeg.len() + MASK_HEADER_LEN > MAX_DATAGRAM {
            return Ok(SendOutcome::Oversized(jpeg.len() + MASK_HEADER_LEN));
        }
        self.send_bounded(&frame_mask_datagram(jpeg), self.endpoints.mask)
    }

    /// 注釈付きJPEG。プレビュー無効なら何もしない
    pub fn send_preview(&self, jpeg: &[u8]) -> Result<Option<SendOutcome>> {
        match self.endpoints.preview {
            Some(addr) => self.send_bounded(jpeg, addr).map(Some),
            None => Ok(None),
        }
    }

    fn send_bounded(&self, data: &[u8], addr: SocketAddr) -> Result<SendOutcome> {
        if data.len() > MAX_DATAGRAM {
            return Ok(SendOutcome::Oversized(data.len()));
        }
        let n = self
            .socket
            .send_to(data, addr)
            .with_context(|| format!("send_to {} failed", addr))?;
        Ok(SendOutcome::Sent(n))
    }
}
