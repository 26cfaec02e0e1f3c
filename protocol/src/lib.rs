//! Wire format shared by the relay server and its clients.
//!
//! Every frame is `tag kind body_len:u32 body`, where the body is a run of
//! optional fields, each `present:u8 [len:u16 bytes]`. The explicit body
//! length lets the decoder consume a frame it cannot make sense of and stay
//! in sync with the stream, so a bad event never costs the connection.

use std::io::{Error, ErrorKind};

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

// encode and decode bypasses traditional libraries
// like serde or message pack

const REQ: u8 = b'+';
const REQ_USERS: u8 = b':';
const REQ_QUIT: u8 = b'$';
const REQ_PRIVMSG: u8 = b'#';
const REQ_REGISTER: u8 = b'&';

const RESP: u8 = b'-';
const RESP_PRIVMSG: u8 = b'*';
const RESP_USERS: u8 = b'@';

const FIELD_ABSENT: u8 = 0;
const FIELD_PRESENT: u8 = 1;

/// tag + kind + u32 body length
pub const HEADER_LEN: usize = 6;

/// Upper bound on a frame body; anything larger is treated as a broken stream.
pub const MAX_FRAME_BODY: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMsg {
    Client(Request),
    Server(Response),
    /// A complete response frame that could not be understood
    Malformed(String),
}

/// Client to server events. Fields are optional on the wire so that the
/// server, not the codec, decides what a missing field means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request { // b'+'
    Register { // b'&'
        username: Option<String>,
    },
    PrivateMessage { // b'#'
        sender: Option<String>,
        recipient: Option<String>,
        message: Option<Vec<u8>>,
    },
    Users, // b':'
    Quit, // b'$'
    /// A complete frame that could not be understood, never encoded
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response { // b'-'
    PrivateMessage { // b'*'
        sender: String,
        message: Vec<u8>,
    },
    Users(Vec<String>), // b'@'
}

pub struct ChatCodec; // unit struct

// convert bytes to ChatMsg enum
impl Decoder for ChatCodec {
    type Item = ChatMsg;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None)
        }

        let tag = src[0];
        let kind = src[1];

        if tag != REQ && tag != RESP {
            return Err(Error::new(ErrorKind::InvalidData, format!("Unknown frame tag {:#04x}", tag)))
        }

        let body_len = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;
        if body_len > MAX_FRAME_BODY {
            return Err(Error::new(ErrorKind::InvalidData, format!("Frame body of {} bytes is too large", body_len)))
        }

        let frame_len = HEADER_LEN + body_len;
        if src.len() < frame_len {
            // wait for rest of frame
            src.reserve(frame_len - src.len());
            return Ok(None)
        }

        src.advance(HEADER_LEN);
        let mut body = src.split_to(body_len);

        match tag {
            REQ => Ok(Some(ChatMsg::Client(decode_request(kind, &mut body)))),
            _ => match decode_response(kind, &mut body) {
                Ok(response) => Ok(Some(ChatMsg::Server(response))),
                Err(reason) => {
                    debug!("Malformed response: {}", reason);
                    Ok(Some(ChatMsg::Malformed(reason)))
                },
            },
        }
    }
}

// Take type T from Encoder<T> and convert it to bytes
impl Encoder<Request> for ChatCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Request::Register{username} => {
                encode_frame(REQ, REQ_REGISTER, &[username.as_deref().map(str::as_bytes)], dst)
            },
            Request::PrivateMessage{sender, recipient, message} => {
                let fields = [
                    sender.as_deref().map(str::as_bytes),
                    recipient.as_deref().map(str::as_bytes),
                    message.as_deref(),
                ];
                encode_frame(REQ, REQ_PRIVMSG, &fields, dst)
            },
            Request::Users => encode_frame(REQ, REQ_USERS, &[], dst),
            Request::Quit => encode_frame(REQ, REQ_QUIT, &[], dst),
            Request::Malformed(_) => {
                Err(Error::new(ErrorKind::InvalidInput, "Malformed requests have no wire form"))
            },
        }
    }
}

// Take type T from Encoder<T> and convert it to bytes
impl Encoder<Response> for ChatCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Response::PrivateMessage{sender, message} => {
                encode_frame(RESP, RESP_PRIVMSG, &[Some(sender.as_bytes()), Some(message.as_slice())], dst)
            },
            Response::Users(names) => {
                let fields: Vec<Option<&[u8]>> = names.iter().map(|n| Some(n.as_bytes())).collect();
                encode_frame(RESP, RESP_USERS, &fields, dst)
            },
        }
    }
}

fn decode_request(kind: u8, body: &mut BytesMut) -> Request {
    let parsed = match kind {
        REQ_REGISTER => decode_text(body).map(|username| Request::Register{username}),
        REQ_PRIVMSG => decode_private_message(body),
        REQ_USERS => Ok(Request::Users),
        REQ_QUIT => Ok(Request::Quit),
        other => Err(format!("unknown request kind {:#04x}", other)),
    };

    match parsed {
        Ok(_) if body.has_remaining() => {
            let reason = format!("{} trailing bytes in request body", body.remaining());
            debug!("{}", reason);
            Request::Malformed(reason)
        },
        Ok(request) => request,
        Err(reason) => {
            debug!("Malformed request: {}", reason);
            Request::Malformed(reason)
        },
    }
}

fn decode_private_message(body: &mut BytesMut) -> Result<Request, String> {
    let sender = decode_text(body)?;
    let recipient = decode_text(body)?;
    let message = decode_field(body)?;
    Ok(Request::PrivateMessage{sender, recipient, message})
}

fn decode_response(kind: u8, body: &mut BytesMut) -> Result<Response, String> {
    let response = match kind {
        RESP_PRIVMSG => {
            let sender = decode_text(body)?
                .ok_or_else(|| "private message without sender".to_owned())?;
            let message = decode_field(body)?
                .ok_or_else(|| "private message without content".to_owned())?;
            Response::PrivateMessage{sender, message}
        },
        RESP_USERS => {
            let mut names = vec![];
            while body.has_remaining() {
                match decode_text(body)? {
                    Some(name) => names.push(name),
                    None => return Err("absent name in users list".to_owned()),
                }
            }
            Response::Users(names)
        },
        other => return Err(format!("unknown response kind {:#04x}", other)),
    };

    if body.has_remaining() {
        return Err(format!("{} trailing bytes in response body", body.remaining()))
    }
    Ok(response)
}

/// Longest prefix of `names` that still encodes as a single users frame
pub fn fit_users(mut names: Vec<String>) -> Vec<String> {
    let mut body_len = 0;
    let mut keep = 0;

    for name in &names {
        let field_len = 1 + 2 + name.len();
        if name.len() > u16::MAX as usize || body_len + field_len > MAX_FRAME_BODY {
            break;
        }
        body_len += field_len;
        keep += 1;
    }

    names.truncate(keep);
    names
}

// read one optional field, a body that has run out reads as absent
fn decode_field(body: &mut BytesMut) -> Result<Option<Vec<u8>>, String> {
    if !body.has_remaining() {
        return Ok(None)
    }

    match body.get_u8() {
        FIELD_ABSENT => Ok(None),
        FIELD_PRESENT => {
            if body.remaining() < 2 {
                return Err("truncated field length".to_owned())
            }
            let len = body.get_u16() as usize;
            if body.remaining() < len {
                return Err(format!("field of {} bytes overruns body", len))
            }
            Ok(Some(body.split_to(len).to_vec()))
        },
        flag => Err(format!("invalid field flag {:#04x}", flag)),
    }
}

fn decode_text(body: &mut BytesMut) -> Result<Option<String>, String> {
    match decode_field(body)? {
        Some(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| "invalid utf8 in text field".to_owned()),
        None => Ok(None),
    }
}

// write header plus fields into BytesMut
fn encode_frame(tag: u8, kind: u8, fields: &[Option<&[u8]>], dst: &mut BytesMut) -> Result<(), Error> {
    let mut body_len = 0;
    for field in fields {
        body_len += 1;
        if let Some(bytes) = field {
            if bytes.len() > u16::MAX as usize {
                return Err(Error::new(ErrorKind::InvalidInput, format!("Field of {} bytes is too large", bytes.len())))
            }
            body_len += 2 + bytes.len();
        }
    }

    if body_len > MAX_FRAME_BODY {
        return Err(Error::new(ErrorKind::InvalidInput, format!("Frame body of {} bytes is too large", body_len)))
    }

    dst.reserve(HEADER_LEN + body_len);
    dst.put_u8(tag);
    dst.put_u8(kind);
    dst.put_u32(body_len as u32);

    for field in fields {
        match field {
            Some(bytes) => {
                dst.put_u8(FIELD_PRESENT);
                dst.put_u16(bytes.len() as u16);
                dst.extend_from_slice(bytes);
            },
            None => dst.put_u8(FIELD_ABSENT),
        }
    }

    Ok(())
}
