use std::sync::Arc;

use axum::{Router, routing::get, response::IntoResponse, extract::{ws::WebSocketUpgrade, Extension}};

use crate::{config::Config, session, state::RoomRegistry};

pub fn router() -> Router {
    Router::new().route("/ws", get(ws_handler))
}

/// Origin is not checked: any page may open a viewer connection.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(rooms): Extension<RoomRegistry>,
    Extension(cfg): Extension<Arc<Config>>,
) -> impl IntoResponse {
    ws.max_message_size(cfg.max_message)
        .max_frame_size(cfg.max_message)
        .on_upgrade(move |s| session::serve(s, rooms, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::{net::TcpListener, time::timeout};
    use tokio_tungstenite::{connect_async, tungstenite::Message};

    async fn spawn_relay() -> String {
        let cfg = Arc::new(Config::default());
        let app = router()
            .layer(Extension(RoomRegistry::new(cfg.room_intake)))
            .layer(Extension(cfg));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("ws://{addr}/ws")
    }

    async fn next_text<S>(ws: &mut S) -> String
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = timeout(Duration::from_secs(2), ws.next()).await.unwrap().unwrap().unwrap();
            if msg.is_text() {
                return msg.to_text().unwrap().to_owned();
            }
        }
    }

    #[tokio::test]
    async fn two_viewers_chat_through_the_relay() {
        let url = spawn_relay().await;
        let (mut alice, _) = connect_async(url.as_str()).await.unwrap();
        let (mut bob, _) = connect_async(url.as_str()).await.unwrap();

        alice
            .send(Message::Text(r#"{"msgtype":1,"roomid":"r1","userid":"u1","username":"Alice"}"#.into()))
            .await
            .unwrap();
        assert_eq!(
            next_text(&mut alice).await,
            r#"{"msgtype":1,"msg":"Alice entered the room","clientnum":1}"#
        );

        bob.send(Message::Text(r#"{"msgtype":1,"roomid":"r1"}"#.into())).await.unwrap();
        assert_eq!(next_text(&mut bob).await, r#"{"msgtype":1,"clientnum":2}"#);
        assert_eq!(next_text(&mut alice).await, r#"{"msgtype":1,"clientnum":2}"#);

        alice.send(Message::Text("garbage".into())).await.unwrap();
        alice.send(Message::Text(r#"{"msgtype":2,"msg":"hi"}"#.into())).await.unwrap();
        assert_eq!(next_text(&mut bob).await, r#"{"msgtype":2,"msg":"hi","username":"Alice"}"#);

        alice.close(None).await.unwrap();
        assert_eq!(
            next_text(&mut bob).await,
            r#"{"msgtype":4,"msg":"Alice left the room","clientnum":1}"#
        );
    }

    #[tokio::test]
    async fn oversized_frames_end_the_connection() {
        let url = spawn_relay().await;
        let (mut ws, _) = connect_async(url.as_str()).await.unwrap();

        let huge = format!(r#"{{"msgtype":2,"msg":"{}"}}"#, "x".repeat(4096));
        ws.send(Message::Text(huge)).await.unwrap();

        let closed = timeout(Duration::from_secs(2), async {
            loop {
                match ws.next().await {
                    None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(closed.is_ok());
    }
}
