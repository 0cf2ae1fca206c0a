use crate::messages::MessageError;
use inlet_amf0::{Amf0Decoder, Amf0Marker};
use inlet_bitbuf::ReadBuffer;
use log::debug;

/// The arguments of a `connect` command.
///
/// Everything except the transaction id comes from the command object; keys
/// match case-insensitively and unrecognised keys are skipped.  `type` is
/// not in the RTMP specification but FMLE sends it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectCommand {
    pub transaction_id: f64,
    pub app: String,
    pub flashver: String,
    pub swf_url: String,
    pub tc_url: String,
    pub connection_type: String,
    pub page_url: String,
    pub fpad: bool,
    pub audio_codecs: f64,
    pub video_codecs: f64,
    pub object_encoding: f64,
}

impl Default for ConnectCommand {
    fn default() -> ConnectCommand {
        ConnectCommand {
            transaction_id: 0.0,
            app: String::new(),
            flashver: String::new(),
            swf_url: String::new(),
            tc_url: String::new(),
            connection_type: String::new(),
            page_url: String::new(),
            fpad: false,
            audio_codecs: 0x0fff as f64,
            video_codecs: 0x00ff as f64,
            object_encoding: 0.0,
        }
    }
}

/// The arguments of a `publish` command.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishCommand {
    pub transaction_id: f64,
    pub publishing_name: String,
    /// `"live"`, `"record"` or `"append"`.
    pub publishing_type: String,
}

/// A recognised client command, or `Unknown` for command names this server
/// does not dispatch on.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Connect(ConnectCommand),
    ReleaseStream {
        transaction_id: f64,
        stream_name: String,
    },
    FcPublish {
        transaction_id: f64,
        stream_name: String,
    },
    CreateStream {
        transaction_id: f64,
    },
    Publish(PublishCommand),
    Unknown {
        name: String,
    },
}

/// Parses the body of a command (AMF0) message into a typed command.
pub fn parse_command(body: &[u8]) -> Result<Command, MessageError> {
    let mut buffer = ReadBuffer::with_capacity(body.len().max(1));
    buffer.append(body);
    let mut decoder = Amf0Decoder::new(&mut buffer);

    let name = decoder.read_string()?;
    match name.as_str() {
        "connect" => parse_connect(&mut decoder),
        "releaseStream" => {
            let (transaction_id, stream_name) = parse_stream_name_command(&mut decoder)?;
            Ok(Command::ReleaseStream {
                transaction_id,
                stream_name,
            })
        }
        "FCPublish" => {
            let (transaction_id, stream_name) = parse_stream_name_command(&mut decoder)?;
            Ok(Command::FcPublish {
                transaction_id,
                stream_name,
            })
        }
        "createStream" => {
            let transaction_id = decoder.read_number()?;
            skip_optional_command_object(&mut decoder)?;
            Ok(Command::CreateStream { transaction_id })
        }
        "publish" => {
            let transaction_id = decoder.read_number()?;
            decoder.read_null()?;
            let publishing_name = decoder.read_string()?;
            let publishing_type = decoder.read_string()?;
            Ok(Command::Publish(PublishCommand {
                transaction_id,
                publishing_name,
                publishing_type,
            }))
        }
        _ => Ok(Command::Unknown { name }),
    }
}

fn parse_connect(decoder: &mut Amf0Decoder) -> Result<Command, MessageError> {
    let transaction_id = decoder.read_number()?;
    if transaction_id != 1.0 {
        return Err(MessageError::ConnectTransactionId { transaction_id });
    }

    decoder.read_object_start()?;

    let mut command = ConnectCommand {
        transaction_id,
        ..ConnectCommand::default()
    };

    loop {
        if decoder.is_finished() {
            break;
        }

        if decoder.next_marker(true)? == Amf0Marker::ObjectEnd {
            decoder.skip_object_end()?;
            break;
        }

        let key = decoder.read_object_key()?;
        if key.eq_ignore_ascii_case("app") {
            command.app = decoder.read_string()?;
        } else if key.eq_ignore_ascii_case("flashver") {
            command.flashver = decoder.read_string()?;
        } else if key.eq_ignore_ascii_case("swfUrl") {
            command.swf_url = decoder.read_string()?;
        } else if key.eq_ignore_ascii_case("tcUrl") {
            command.tc_url = decoder.read_string()?;
        } else if key.eq_ignore_ascii_case("type") {
            command.connection_type = decoder.read_string()?;
        } else if key.eq_ignore_ascii_case("fpad") {
            command.fpad = decoder.read_boolean()?;
        } else if key.eq_ignore_ascii_case("audioCodecs") {
            command.audio_codecs = decoder.read_number()?;
        } else if key.eq_ignore_ascii_case("videoCodecs") {
            command.video_codecs = decoder.read_number()?;
        } else if key.eq_ignore_ascii_case("pageUrl") {
            command.page_url = decoder.read_string()?;
        } else if key.eq_ignore_ascii_case("objectEncoding") {
            command.object_encoding = decoder.read_number()?;
        } else {
            debug!("connect: skipping unrecognised key {:?}", key);
            let marker = decoder.next_marker(false)?;
            decoder.skip_value(marker)?;
        }
    }

    Ok(Command::Connect(command))
}

/// `releaseStream` and `FCPublish` share a shape: transaction id, an
/// optional null-or-object nobody cares about, then the stream name.
fn parse_stream_name_command(decoder: &mut Amf0Decoder) -> Result<(f64, String), MessageError> {
    let transaction_id = decoder.read_number()?;
    skip_optional_command_object(decoder)?;
    let stream_name = decoder.read_string()?;
    Ok((transaction_id, stream_name))
}

fn skip_optional_command_object(decoder: &mut Amf0Decoder) -> Result<(), MessageError> {
    if decoder.is_finished() {
        return Ok(());
    }

    match decoder.next_marker(false)? {
        Amf0Marker::Null => decoder.read_null()?,
        Amf0Marker::Object => decoder.skip_value(Amf0Marker::Object)?,
        _ => (),
    }

    Ok(())
}
