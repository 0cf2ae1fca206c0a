use crate::messages::{ConnectCommand, Message, MetaData};

/// The external collaborator a publishing session feeds.
///
/// The protocol engine decodes the RTMP exchange; everything downstream
/// (re-muxing, uploading, recording) belongs to the actor.  Callbacks run
/// on the connection's own thread and may block it; a callback returning
/// `false` aborts the connection.
///
/// `on_disconnect` is terminal and is invoked exactly once, whether the
/// peer closed the socket or a protocol error killed the session.
pub trait RtmpActor {
    /// A client asked to connect.  The command carries the application name
    /// and the rest of the connect object.
    fn on_connect(&mut self, command: &ConnectCommand) -> bool;

    fn on_disconnect(&mut self);

    /// A message stream id is about to be handed to the client.
    fn on_create_stream(&mut self, stream_id: u32) -> bool;

    /// The client starts publishing `name` (query string already stripped)
    /// on the given message stream.
    fn on_publish(&mut self, stream_id: u32, name: &str) -> bool;

    /// A `@setDataFrame` metadata message arrived on a stream.
    fn on_metadata(&mut self, stream_id: u32, metadata: MetaData) -> bool;

    /// An audio or video message arrived on a stream.
    fn on_media(&mut self, stream_id: u32, is_video: bool, message: &Message) -> bool;
}
