use crate::messages::MessageError;
use crate::time::RtmpTimestamp;
use bytes::Bytes;
use inlet_amf0::{Amf0Decoder, Amf0Marker};
use inlet_bitbuf::ReadBuffer;
use log::warn;

/// Stream metadata from a `@setDataFrame` / `onMetaData` data message.
///
/// Only the keys encoders are known to send are lifted into fields; the
/// rest are skipped.  The raw AMF0 bytes following the `@setDataFrame`
/// string are preserved verbatim in `raw` so a downstream muxer can re-emit
/// the metadata without re-encoding it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaData {
    pub author: Option<String>,
    pub copyright: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub rating: Option<String>,
    pub title: Option<String>,
    pub preset_name: Option<String>,
    pub creation_date: Option<String>,
    pub video_device: Option<String>,
    pub frame_rate: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub video_codec_id: Option<String>,
    pub video_data_rate: Option<f64>,
    pub avc_level: Option<f64>,
    pub avc_profile: Option<f64>,
    pub video_keyframe_frequency: Option<f64>,
    pub audio_device: Option<String>,
    pub audio_sample_rate: Option<f64>,
    pub audio_channels: Option<f64>,
    pub audio_input_volume: Option<f64>,
    pub audio_codec_id: Option<String>,
    pub audio_data_rate: Option<f64>,
    pub raw: Bytes,
    pub timestamp: RtmpTimestamp,
}

/// Parses the body of a data (AMF0) message.
///
/// Returns `Ok(None)` when the leading string is not `@setDataFrame`; other
/// data messages are not an error, the caller just has nothing to do with
/// them.
pub fn parse_data_frame(body: &Bytes) -> Result<Option<MetaData>, MessageError> {
    let mut buffer = ReadBuffer::with_capacity(body.len().max(1));
    buffer.append(body);
    let mut decoder = Amf0Decoder::new(&mut buffer);

    match decoder.next_marker(false) {
        Ok(Amf0Marker::String) => (),
        Ok(_) => return Ok(None),
        Err(error) => return Err(error.into()),
    }

    if decoder.read_string()? != "@setDataFrame" {
        return Ok(None);
    }

    let mut metadata = MetaData::default();
    metadata.raw = body.slice(body.len() - decoder.remaining()..);

    if decoder.read_string()? != "onMetaData" {
        return Err(MessageError::UnexpectedField {
            expected: "onMetaData",
        });
    }

    match decoder.next_marker(false)? {
        Amf0Marker::Object => decoder.read_object_start()?,
        Amf0Marker::EcmaArray => {
            decoder.read_ecma_array_start()?;
        }
        _ => {
            return Err(MessageError::UnexpectedField {
                expected: "an object or ecma array of metadata properties",
            })
        }
    }

    loop {
        if decoder.is_finished() {
            break;
        }

        if decoder.next_marker(true)? == Amf0Marker::ObjectEnd {
            decoder.skip_object_end()?;
            break;
        }

        let key = decoder.read_object_key()?;
        let marker = decoder.next_marker(false)?;
        match key.as_str() {
            "author" => metadata.author = Some(decoder.read_string()?),
            "copyright" => metadata.copyright = Some(decoder.read_string()?),
            "description" => metadata.description = Some(decoder.read_string()?),
            "keywords" => metadata.keywords = Some(decoder.read_string()?),
            "rating" => metadata.rating = Some(decoder.read_string()?),
            "title" => metadata.title = Some(decoder.read_string()?),
            "presetname" => metadata.preset_name = Some(decoder.read_string()?),
            "creationdate" => metadata.creation_date = Some(decoder.read_string()?),
            "videodevice" => metadata.video_device = Some(decoder.read_string()?),
            "framerate" => metadata.frame_rate = Some(decoder.read_number()?),
            "width" => metadata.width = Some(decoder.read_number()?),
            "height" => metadata.height = Some(decoder.read_number()?),
            "videocodecid" => metadata.video_codec_id = Some(read_codec_id(&mut decoder, marker)?),
            "videodatarate" => metadata.video_data_rate = Some(decoder.read_number()?),
            "avclevel" => metadata.avc_level = Some(decoder.read_number()?),
            "avcprofile" => metadata.avc_profile = Some(decoder.read_number()?),
            "videokeyframe_frequency" => {
                metadata.video_keyframe_frequency = Some(decoder.read_number()?)
            }
            "audiodevice" => metadata.audio_device = Some(decoder.read_string()?),
            "audiosamplerate" => metadata.audio_sample_rate = Some(decoder.read_number()?),
            "audiochannels" => metadata.audio_channels = Some(decoder.read_number()?),
            "audioinputvolume" => metadata.audio_input_volume = Some(decoder.read_number()?),
            "audiocodecid" => metadata.audio_codec_id = Some(read_codec_id(&mut decoder, marker)?),
            "audiodatarate" => metadata.audio_data_rate = Some(decoder.read_number()?),
            _ => {
                warn!("onMetaData: ignoring unknown key {:?}", key);
                decoder.skip_value(marker)?;
            }
        }
    }

    Ok(Some(metadata))
}

/// Codec ids arrive as strings from FMLE but as numbers from ffmpeg.
fn read_codec_id(decoder: &mut Amf0Decoder, marker: Amf0Marker) -> Result<String, MessageError> {
    if marker == Amf0Marker::Number {
        Ok(format_number(decoder.read_number()?))
    } else {
        Ok(decoder.read_string()?)
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inlet_amf0::Amf0Encoder;
    use inlet_bitbuf::WriteBuffer;

    fn data_frame_body(write_properties: impl FnOnce(&mut Amf0Encoder)) -> Bytes {
        let mut buffer = WriteBuffer::new();
        let mut encoder = Amf0Encoder::new(&mut buffer);
        encoder.write_string("@setDataFrame").unwrap();
        encoder.write_string("onMetaData").unwrap();
        write_properties(&mut encoder);
        Bytes::from(buffer.take())
    }

    #[test]
    fn can_parse_metadata_from_an_ecma_array() {
        let body = data_frame_body(|encoder| {
            encoder.write_ecma_array_start(4).unwrap();
            encoder.write_object_key("width").unwrap();
            encoder.write_number(1280.0).unwrap();
            encoder.write_object_key("height").unwrap();
            encoder.write_number(720.0).unwrap();
            encoder.write_object_key("videocodecid").unwrap();
            encoder.write_string("avc1").unwrap();
            encoder.write_object_key("audiocodecid").unwrap();
            encoder.write_string("mp4a").unwrap();
            encoder.write_object_end().unwrap();
        });

        let metadata = parse_data_frame(&body).unwrap().unwrap();
        assert_eq!(metadata.width, Some(1280.0));
        assert_eq!(metadata.height, Some(720.0));
        assert_eq!(metadata.video_codec_id.as_deref(), Some("avc1"));
        assert_eq!(metadata.audio_codec_id.as_deref(), Some("mp4a"));
    }

    #[test]
    fn numeric_codec_ids_are_stringified() {
        let body = data_frame_body(|encoder| {
            encoder.write_object_start().unwrap();
            encoder.write_object_key("videocodecid").unwrap();
            encoder.write_number(7.0).unwrap();
            encoder.write_object_key("audiocodecid").unwrap();
            encoder.write_number(10.0).unwrap();
            encoder.write_object_end().unwrap();
        });

        let metadata = parse_data_frame(&body).unwrap().unwrap();
        assert_eq!(metadata.video_codec_id.as_deref(), Some("7"));
        assert_eq!(metadata.audio_codec_id.as_deref(), Some("10"));
    }

    #[test]
    fn unknown_keys_are_skipped() {
        let body = data_frame_body(|encoder| {
            encoder.write_object_start().unwrap();
            encoder.write_object_key("encoder").unwrap();
            encoder.write_string("obs-output").unwrap();
            encoder.write_object_key("framerate").unwrap();
            encoder.write_number(30.0).unwrap();
            encoder.write_object_end().unwrap();
        });

        let metadata = parse_data_frame(&body).unwrap().unwrap();
        assert_eq!(metadata.frame_rate, Some(30.0));
    }

    #[test]
    fn raw_blob_starts_after_the_set_data_frame_string() {
        let body = data_frame_body(|encoder| {
            encoder.write_object_start().unwrap();
            encoder.write_object_end().unwrap();
        });

        let metadata = parse_data_frame(&body).unwrap().unwrap();

        // 1 byte marker + 2 byte length + 13 bytes of "@setDataFrame".
        assert_eq!(&metadata.raw[..], &body[16..]);
        assert_eq!(metadata.raw[0], 0x02, "raw blob should start at onMetaData");
    }

    #[test]
    fn other_data_names_are_ignorable() {
        let mut buffer = WriteBuffer::new();
        let mut encoder = Amf0Encoder::new(&mut buffer);
        encoder.write_string("onTextData").unwrap();
        let body = Bytes::from(buffer.take());

        assert_eq!(parse_data_frame(&body).unwrap(), None);
    }

    #[test]
    fn missing_on_metadata_is_an_error() {
        let mut buffer = WriteBuffer::new();
        let mut encoder = Amf0Encoder::new(&mut buffer);
        encoder.write_string("@setDataFrame").unwrap();
        encoder.write_string("somethingElse").unwrap();
        let body = Bytes::from(buffer.take());

        match parse_data_frame(&body) {
            Err(MessageError::UnexpectedField { expected }) => assert_eq!(expected, "onMetaData"),
            x => panic!("Expected UnexpectedField, got {:?}", x),
        }
    }
}
