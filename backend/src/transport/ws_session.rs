use super::{Connection, Frame, TransportError};
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{future, SinkExt, StreamExt};
use std::borrow::Cow;

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Text(text) => Frame::Text(text),
            Message::Binary(data) => Frame::Binary(data),
            Message::Close(frame) => Frame::Close(frame.map(|frame| frame.code)),
            Message::Ping(_) | Message::Pong(_) => Frame::Heartbeat,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Close(code) => Message::Close(code.map(|code| CloseFrame {
                code,
                reason: Cow::Borrowed(""),
            })),
            Frame::Heartbeat => Message::Ping(Vec::new()),
        }
    }
}

impl Connection {
    pub fn from_websocket(socket: WebSocket) -> Self {
        let (sender, receiver) = socket.split();
        let sink = sender
            .sink_map_err(TransportError::from)
            .with(|frame: Frame| future::ready(Ok::<Message, TransportError>(frame.into())));
        let stream = receiver.map(|result| result.map(Frame::from).map_err(TransportError::from));
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}
