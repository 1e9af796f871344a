//! Stream lifecycle through the public API: temp streams, file streams,
//! pipes, and the close/detach transitions.

use netstream_core::{ByteStream, Error, Handle, Stream, StreamFactory, StreamType};
use netstream_fd::Pipe;
use std::io::SeekFrom;

fn factory() -> StreamFactory {
    StreamFactory::new()
}

// ── temp streams ──

#[test]
fn temp_stream_tell_eof_and_read_back() {
    let mut stream = factory().create_stream(b"abc").unwrap();
    assert_eq!(stream.tell().unwrap(), 3);
    assert!(!stream.eof());

    assert_eq!(stream.write(b"def").unwrap(), 3);
    assert_eq!(stream.get_size(), Some(6));

    stream.rewind().unwrap();
    assert_eq!(stream.read(4).unwrap(), b"abcd");
    assert_eq!(stream.read(10).unwrap(), b"ef");
    assert!(stream.read(10).unwrap().is_empty());
    assert!(stream.eof());

    stream.seek(SeekFrom::Start(1)).unwrap();
    assert!(!stream.eof());
    assert_eq!(stream.get_contents().unwrap(), b"bcdef");
}

#[test]
fn to_string_rewinds_and_reads_everything() {
    let mut stream = factory().create_stream(b"hello world").unwrap();
    assert_eq!(stream.to_string_lossy(), "hello world");
}

#[test]
fn to_string_after_close_is_empty() {
    let mut stream = factory().create_stream(b"gone").unwrap();
    stream.close();
    assert_eq!(stream.to_string_lossy(), "");
}

#[test]
fn metadata_reports_temp_type() {
    let stream = factory().create_stream(b"x").unwrap();
    let meta = stream.get_metadata().unwrap();
    assert_eq!(meta.stream_type, StreamType::Temp);
    assert!(meta.seekable);
    assert_eq!(
        stream.get_metadata_value("stream_type"),
        Some(serde_json::Value::from("TEMP"))
    );
    assert_eq!(stream.get_metadata_value("no_such_key"), None);
}

// ── detach and close ──

#[test]
fn detach_releases_handle_once() {
    let mut stream = factory().create_stream(b"keep").unwrap();
    let handle = stream.detach().expect("first detach returns the handle");
    assert!(stream.detach().is_none());

    assert!(!stream.is_readable());
    assert!(!stream.is_writable());
    assert!(!stream.is_seekable());
    assert!(stream.eof());
    assert!(stream.get_metadata().is_none());
    assert!(stream.get_size().is_none());
    assert!(matches!(stream.tell(), Err(Error::StreamDetached)));
    assert!(matches!(stream.read(1), Err(Error::StreamDetached)));
    assert!(matches!(stream.write(b"x"), Err(Error::StreamDetached)));
    assert!(matches!(stream.seek(SeekFrom::Start(0)), Err(Error::StreamDetached)));
    assert!(matches!(stream.get_contents(), Err(Error::StreamDetached)));

    // the handle outlives the stream it came from
    let mut reattached = Stream::new(handle).unwrap();
    reattached.rewind().unwrap();
    assert_eq!(reattached.get_contents().unwrap(), b"keep");
}

#[test]
fn close_is_idempotent() {
    let mut stream = factory().create_stream(b"").unwrap();
    stream.close();
    stream.close();
    assert!(stream.detach().is_none());
}

// ── files ──

#[test]
fn append_mode_writes_at_end() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), b"one,").unwrap();
    let mut stream = factory().create_stream_from_file(file.path(), "a+").unwrap();
    stream.write(b"two").unwrap();
    stream.rewind().unwrap();
    assert_eq!(stream.get_contents().unwrap(), b"one,two");
}

#[test]
fn write_only_file_refuses_reads() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut stream = factory().create_stream_from_file(file.path(), "wb").unwrap();
    assert!(matches!(stream.read(1), Err(Error::NotReadable)));
    assert!(matches!(stream.get_contents(), Err(Error::NotReadable)));
}

#[test]
fn directory_is_not_a_stream() {
    let dir = tempfile::TempDir::new().unwrap();
    let file = std::fs::File::open(dir.path()).unwrap();
    let err = Stream::new(Handle::new(file).unwrap()).unwrap_err();
    assert!(matches!(err, Error::InvalidHandle(_)));
}

// ── pipes ──

#[test]
fn pipe_ends_have_one_direction_and_no_seek() {
    let pipe = Pipe::new().unwrap();
    let mut reader = Stream::from_fd(pipe.read).unwrap();
    let mut writer = Stream::from_fd(pipe.write).unwrap();

    assert!(reader.is_readable() && !reader.is_writable());
    assert!(writer.is_writable() && !writer.is_readable());
    assert!(!reader.is_seekable());
    assert!(matches!(reader.seek(SeekFrom::Start(0)), Err(Error::NotSeekable)));
    assert!(reader.get_size().is_none());

    writer.write(b"through the pipe").unwrap();
    writer.close();
    assert_eq!(reader.get_contents().unwrap(), b"through the pipe");
    assert!(reader.eof());
}

// ── trait object use ──

#[test]
fn byte_stream_trait_objects() {
    let mut streams: Vec<Box<dyn ByteStream>> = vec![
        Box::new(factory().create_stream(b"a").unwrap()),
        Box::new(factory().create_stream(b"bb").unwrap()),
    ];
    let sizes: Vec<Option<u64>> = streams.iter().map(|s| s.get_size()).collect();
    assert_eq!(sizes, [Some(1), Some(2)]);
    for stream in &mut streams {
        stream.rewind().unwrap();
    }
    assert_eq!(streams[1].get_contents().unwrap(), b"bb");
}
