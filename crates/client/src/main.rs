//! Terminal chat client.
//!
//! A thin interactive shell over the library, useful for poking at a live
//! backend: global chat by default, `/msg` for private messages, `/who` for
//! the roster.

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use std::sync::Arc;

    use blogchat_client::config::SocketConfig;
    use blogchat_client::identity::guest_user;
    use blogchat_client::session::{ChatSession, Scope, SharedSink};
    use blogchat_client::socket::{
        DefaultConnector, SharedConnector, SocketConnection, TokenProvider,
    };
    use blogchat_shared::protocol::names;
    use blogchat_shared::{ChatUser, ServerEvent};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = SocketConfig::from_env();
    let me = match std::env::var("BLOGCHAT_USERNAME") {
        Ok(name) => ChatUser::new(format!("cli-{}", name), name),
        Err(_) => guest_user(),
    };
    println!("connecting to {} as {}", config.url, me.username);

    let connection = SocketConnection::new(config, Arc::new(DefaultConnector) as SharedConnector);
    let session = ChatSession::new(me, Arc::new(connection.clone()) as SharedSink);
    session.attach(&connection);

    let _global = connection.subscribe(names::CHAT_GLOBAL, |data| {
        if let Ok(Some(ServerEvent::Global(msg))) = ServerEvent::parse(names::CHAT_GLOBAL, data) {
            println!("[global] {}: {}", msg.sender.username, msg.text);
        }
    });
    let _private = connection.subscribe(names::CHAT_PRIVATE, |data| {
        if let Ok(Some(ServerEvent::Private(msg))) = ServerEvent::parse(names::CHAT_PRIVATE, data) {
            println!("[private] {}: {}", msg.sender.username, msg.text);
        }
    });
    let typing_session = session.clone();
    let _typing = connection.subscribe(names::CHAT_TYPING, move |_| {
        if let Some(line) = typing_session.typing_line(Scope::Global) {
            println!("({})", line);
        }
    });

    // A fresh token per attempt; unset means a guest handshake.
    let tokens: TokenProvider = Arc::new(|| {
        Box::pin(async { std::env::var("BLOGCHAT_TOKEN").ok() })
    });
    connection.connect(tokens);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line.split_whitespace().collect::<Vec<_>>().as_slice() {
            [] => {}
            ["/quit"] => break,
            ["/who"] => {
                for user in session.online_users() {
                    println!("  {} ({})", user.username, user.uid);
                }
            }
            ["/msg", peer, ..] => {
                let text = line["/msg".len()..].trim_start()[peer.len()..].trim_start();
                let roster = session.online_users();
                match roster
                    .iter()
                    .find(|user| user.uid == *peer || user.username == *peer)
                {
                    Some(user) => {
                        if !session.send_message(text, Some(user)) {
                            println!("nothing to send");
                        }
                    }
                    None => println!("no such user: {}", peer),
                }
            }
            _ => {
                session.send_message(line, None);
            }
        }
    }

    session.shutdown();
    connection.disconnect();
    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn main() {}
