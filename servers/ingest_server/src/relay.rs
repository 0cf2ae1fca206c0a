//! The demo collaborator: one media queue and one forwarding thread per
//! published stream.
//!
//! The connection thread pushes length-framed media into the stream's
//! [`MediaQueue`]; the forwarder drains it into a file under the output
//! directory.  The framing is an opaque dump (type id, body length,
//! timestamp, body), just enough for the forwarder to be a realistic
//! consumer; re-muxing into a real container is the job of a production
//! collaborator.

use inlet_rtmp::actor::RtmpActor;
use inlet_rtmp::messages::{ConnectCommand, Message, MetaData};
use inlet_rtmp::queue::{MediaQueue, QueueError};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// High-water mark for a stream's queue; a forwarder this far behind is
/// effectively dead and the connection should abort.
const QUEUE_CAPACITY: usize = 4 * 1024 * 1024;

/// How long a forwarder waits on an empty queue before giving up.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a disconnect waits for a forwarder to drain and exit.
const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

const METADATA_TYPE_ID: u8 = 18;
const AUDIO_TYPE_ID: u8 = 8;
const VIDEO_TYPE_ID: u8 = 9;

struct StreamPipe {
    queue: Arc<MediaQueue>,
    forwarder: Option<JoinHandle<()>>,
}

pub struct RelayActor {
    output_dir: PathBuf,
    app: String,
    pipes: HashMap<u32, StreamPipe>,
}

impl RelayActor {
    pub fn new(output_dir: PathBuf) -> RelayActor {
        RelayActor {
            output_dir,
            app: String::new(),
            pipes: HashMap::new(),
        }
    }

    fn push_frame(&mut self, stream_id: u32, type_id: u8, timestamp: u32, body: &[u8]) -> bool {
        let pipe = match self.pipes.get(&stream_id) {
            Some(pipe) => pipe,
            None => {
                debug!("dropping frame for unpublished stream {}", stream_id);
                return true;
            }
        };

        let mut frame = Vec::with_capacity(9 + body.len());
        frame.push(type_id);
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend_from_slice(&timestamp.to_be_bytes());
        frame.extend_from_slice(body);

        match pipe.queue.push(&frame) {
            Ok(()) => true,
            Err(QueueError::Overflow { capacity }) => {
                error!(
                    "stream {} forwarder fell more than {} bytes behind",
                    stream_id, capacity
                );
                false
            }
            Err(err) => {
                error!("stream {} queue rejected a frame: {}", stream_id, err);
                false
            }
        }
    }
}

impl RtmpActor for RelayActor {
    fn on_connect(&mut self, command: &ConnectCommand) -> bool {
        info!(
            "encoder connected to app {:?} ({})",
            command.app, command.flashver
        );
        self.app = command.app.clone();
        true
    }

    fn on_disconnect(&mut self) {
        for (stream_id, mut pipe) in self.pipes.drain() {
            pipe.queue.finish();

            if let Some(handle) = pipe.forwarder.take() {
                if !join_with_timeout(handle, JOIN_TIMEOUT) {
                    // The forwarder's own idle timeout bounds how long it
                    // can outlive us.
                    warn!("abandoning the forwarder for stream {}", stream_id);
                }
            }
        }

        info!("encoder disconnected from app {:?}", self.app);
    }

    fn on_create_stream(&mut self, stream_id: u32) -> bool {
        debug!("stream id {} handed out", stream_id);
        true
    }

    fn on_publish(&mut self, stream_id: u32, name: &str) -> bool {
        let file_name = sanitize_stream_name(name);
        let path = self.output_dir.join(format!("{}.dump", file_name));

        let mut file = match File::create(&path) {
            Ok(file) => file,
            Err(err) => {
                error!("cannot create {}: {}", path.display(), err);
                return false;
            }
        };

        info!(
            "stream {} publishing {:?} into {}",
            stream_id,
            name,
            path.display()
        );

        let queue = Arc::new(MediaQueue::new(QUEUE_CAPACITY));
        let reader = Arc::clone(&queue);
        let forwarder = std::thread::spawn(move || {
            let mut buffer = [0_u8; 32 * 1024];
            loop {
                match reader.read(&mut buffer, IDLE_TIMEOUT) {
                    Ok(0) => {
                        debug!("stream drained, forwarder exiting");
                        return;
                    }
                    Ok(count) => {
                        if let Err(err) = file.write_all(&buffer[..count]) {
                            error!("writing media dump failed: {}", err);
                            reader.fail();
                            return;
                        }
                    }
                    Err(err) => {
                        warn!("forwarder stopping: {}", err);
                        return;
                    }
                }
            }
        });

        self.pipes.insert(
            stream_id,
            StreamPipe {
                queue,
                forwarder: Some(forwarder),
            },
        );

        true
    }

    fn on_metadata(&mut self, stream_id: u32, metadata: MetaData) -> bool {
        debug!(
            "metadata on stream {}: {:?}x{:?} video {:?}, audio {:?}",
            stream_id, metadata.width, metadata.height, metadata.video_codec_id,
            metadata.audio_codec_id
        );

        let raw = metadata.raw.clone();
        self.push_frame(stream_id, METADATA_TYPE_ID, metadata.timestamp.value, &raw)
    }

    fn on_media(&mut self, stream_id: u32, is_video: bool, message: &Message) -> bool {
        let type_id = if is_video { VIDEO_TYPE_ID } else { AUDIO_TYPE_ID };
        self.push_frame(stream_id, type_id, message.timestamp.value, &message.body)
    }
}

/// Waits up to `timeout` for the thread to finish, then joins it.  There is
/// no way to interrupt a thread, so a stuck forwarder is left to its idle
/// timeout and the handle is dropped.
fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return false;
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    let _ = handle.join();
    true
}

fn sanitize_stream_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "stream".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_names_cannot_escape_the_output_directory() {
        assert_eq!(sanitize_stream_name("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize_stream_name("cam-1_hd.bak"), "cam-1_hd.bak");
        assert_eq!(sanitize_stream_name(""), "stream");
    }
}
