//! Async Frame I/O

use super::{Frame, FrameError, FrameHeader, HEADER_LEN};
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Read one frame, giving up after `limit`
pub async fn read_frame<R>(reader: &mut R, limit: Duration) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    timeout(limit, read_frame_inner(reader))
        .await
        .map_err(|_| FrameError::Timeout(limit))?
}

async fn read_frame_inner<R>(reader: &mut R) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_LEN];
    reader.read_exact(&mut raw).await?;
    let header = FrameHeader::decode(&raw)?;

    let mut body = vec![0u8; header.body_length as usize];
    if !body.is_empty() {
        reader.read_exact(&mut body).await?;
    }

    Ok(Frame {
        header,
        body: Bytes::from(body),
    })
}

/// Write one frame and flush it, giving up after `limit`
pub async fn write_frame<W>(writer: &mut W, frame: &Frame, limit: Duration) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let encoded = frame.encode()?;
    timeout(limit, async {
        writer.write_all(&encoded).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| FrameError::Timeout(limit))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageType;

    const LIMIT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_read_frame_with_body() {
        let frame = Frame::new(MessageType::CommandAck, 7, "ok");
        let encoded = frame.encode().unwrap();
        let mut mock = tokio_test::io::Builder::new()
            .read(&encoded[..HEADER_LEN])
            .read(&encoded[HEADER_LEN..])
            .build();

        let received = read_frame(&mut mock, LIMIT).await.unwrap();
        assert_eq!(received.message_type(), MessageType::CommandAck);
        assert_eq!(received.header.sequence, 7);
        assert_eq!(received.body_text(), "ok");
    }

    #[tokio::test]
    async fn test_write_frame_emits_encoded_bytes() {
        let frame = Frame::new(MessageType::Hello, 1, Bytes::new());
        let encoded = frame.encode().unwrap();
        let mut mock = tokio_test::io::Builder::new().write(&encoded).build();

        write_frame(&mut mock, &frame, LIMIT).await.unwrap();
    }

    #[tokio::test]
    async fn test_read_frame_eof_is_io_error() {
        let mut mock = tokio_test::io::Builder::new().read(&[1, 2, 3]).build();
        match read_frame(&mut mock, LIMIT).await {
            Err(FrameError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_frame_times_out() {
        let (mut client, _server) = tokio::io::duplex(64);
        match read_frame(&mut client, Duration::from_millis(50)).await {
            Err(FrameError::Timeout(limit)) => assert_eq!(limit, Duration::from_millis(50)),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
