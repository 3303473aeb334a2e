//! Command handler serving groups to clients and peers

use std::fmt::Write;
use std::sync::Arc;

use herdcache::{Error, Registry};
use tracing::debug;

use crate::pool::PeerPool;
use crate::protocol::Frame;

/// Executes one request frame against the node's registry.
///
/// `handle` may block on peer round-trips and loaders, so callers on the
/// async side run it on the blocking pool.
#[derive(Clone)]
pub struct CommandHandler {
    registry: Arc<Registry>,
    pool: Arc<PeerPool>,
}

impl CommandHandler {
    pub fn new(registry: Arc<Registry>, pool: Arc<PeerPool>) -> Self {
        Self { registry, pool }
    }

    pub fn handle(&self, request: Frame) -> Frame {
        let args = match request {
            Frame::Array(Some(items)) if !items.is_empty() => items,
            _ => return Frame::error("ERR", "invalid command format"),
        };

        let mut words = Vec::with_capacity(args.len());
        for arg in args {
            match arg.into_bulk() {
                Some(word) => words.push(word),
                None => return Frame::error("ERR", "arguments must be bulk strings"),
            }
        }

        let command = String::from_utf8_lossy(&words[0]).to_uppercase();
        let args = &words[1..];
        match command.as_str() {
            "PING" => self.handle_ping(args),
            "GET" => self.handle_get(args),
            "PEERS" => self.handle_peers(args),
            "INFO" => self.handle_info(args),
            // redis-cli sends this on connect
            "COMMAND" => Frame::Array(Some(vec![])),
            _ => Frame::error("ERR", format!("unknown command '{command}'")),
        }
    }

    fn handle_ping(&self, args: &[Vec<u8>]) -> Frame {
        match args {
            [] => Frame::Simple("PONG".to_string()),
            [msg] => Frame::Bulk(Some(msg.clone())),
            _ => wrong_arity("ping"),
        }
    }

    fn handle_get(&self, args: &[Vec<u8>]) -> Frame {
        let [group, key] = args else {
            return wrong_arity("get");
        };
        let (Ok(group), Ok(key)) = (std::str::from_utf8(group), std::str::from_utf8(key)) else {
            return Frame::error("ERR", "group and key must be UTF-8");
        };
        debug!(group, key, "GET");

        let group = match self.registry.lookup(group) {
            Ok(group) => group,
            Err(err @ Error::GroupNotFound(_)) => return Frame::error("NOTFOUND", err),
            Err(err) => return Frame::error("ERR", err),
        };

        match group.get(key) {
            Ok(value) => Frame::Bulk(Some(value.to_vec())),
            Err(err) => Frame::error("ERR", format_args!("internal error: {err}")),
        }
    }

    fn handle_peers(&self, args: &[Vec<u8>]) -> Frame {
        let mut peers = Vec::with_capacity(args.len());
        for arg in args {
            match std::str::from_utf8(arg) {
                Ok(peer) if !peer.is_empty() => peers.push(peer.to_string()),
                _ => return Frame::error("ERR", "peer addresses must be non-empty UTF-8"),
            }
        }
        if peers.is_empty() {
            return wrong_arity("peers");
        }

        self.pool.set(peers);
        Frame::Simple("OK".to_string())
    }

    fn handle_info(&self, args: &[Vec<u8>]) -> Frame {
        let names = match args {
            [] => self.registry.names(),
            [name] => vec![String::from_utf8_lossy(name).into_owned()],
            _ => return wrong_arity("info"),
        };

        let mut info = String::new();
        let _ = write!(
            info,
            "# Node\r\nherdcache_version:{}\r\nself:{}\r\npeers:{}\r\n",
            env!("CARGO_PKG_VERSION"),
            self.pool.self_addr(),
            self.pool.peers().join(","),
        );

        for name in names {
            let Some(group) = self.registry.get(&name) else {
                return Frame::error("NOTFOUND", Error::GroupNotFound(name));
            };
            let stats = group.stats();
            let _ = write!(
                info,
                "\r\n# Group {}\r\n\
                 cache_entries:{}\r\n\
                 cache_bytes:{}\r\n\
                 gets:{}\r\n\
                 hits:{}\r\n\
                 hit_ratio:{:.2}\r\n\
                 peer_loads:{}\r\n\
                 peer_errors:{}\r\n\
                 local_loads:{}\r\n\
                 local_load_errors:{}\r\n\
                 evictions:{}\r\n",
                group.name(),
                group.cache_len(),
                group.cache_bytes_used(),
                stats.gets(),
                stats.hits(),
                stats.hit_ratio(),
                stats.peer_loads(),
                stats.peer_errors(),
                stats.local_loads(),
                stats.local_load_errors(),
                stats.evictions(),
            );
        }

        Frame::Bulk(Some(info.into_bytes()))
    }
}

fn wrong_arity(command: &str) -> Frame {
    Frame::error(
        "ERR",
        format_args!("wrong number of arguments for '{command}' command"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::runtime::Runtime;

    const SELF: &str = "127.0.0.1:7001";

    fn handler(rt: &Runtime) -> CommandHandler {
        let registry = Arc::new(Registry::new());
        let group = registry
            .new_group("scores", 0, |key: &str| -> anyhow::Result<Vec<u8>> {
                match key {
                    "Tom" => Ok(b"630".to_vec()),
                    _ => anyhow::bail!("{key} not exist"),
                }
            })
            .unwrap();

        let pool = Arc::new(PeerPool::new(SELF, 50, Duration::from_secs(1), rt.handle().clone()));
        pool.set([SELF]);
        group.register_peers(pool.clone());
        CommandHandler::new(registry, pool)
    }

    #[test]
    fn test_ping() {
        let rt = Runtime::new().unwrap();
        let handler = handler(&rt);

        assert_eq!(handler.handle(Frame::command(["PING"])), Frame::Simple("PONG".into()));
        assert_eq!(
            handler.handle(Frame::command(["ping", "hello"])),
            Frame::Bulk(Some(b"hello".to_vec()))
        );
    }

    #[test]
    fn test_get_value() {
        let rt = Runtime::new().unwrap();
        let handler = handler(&rt);

        let reply = handler.handle(Frame::command(["GET", "scores", "Tom"]));
        assert_eq!(reply, Frame::Bulk(Some(b"630".to_vec())));
    }

    #[test]
    fn test_get_missing_group() {
        let rt = Runtime::new().unwrap();
        let handler = handler(&rt);

        let reply = handler.handle(Frame::command(["GET", "users", "Tom"]));
        assert_eq!(reply, Frame::Error("NOTFOUND group users not found".into()));
    }

    #[test]
    fn test_get_loader_failure() {
        let rt = Runtime::new().unwrap();
        let handler = handler(&rt);

        let reply = handler.handle(Frame::command(["GET", "scores", "Kim"]));
        assert_eq!(
            reply,
            Frame::Error("ERR internal error: load failed: Kim not exist".into())
        );
    }

    #[test]
    fn test_bad_requests() {
        let rt = Runtime::new().unwrap();
        let handler = handler(&rt);

        assert!(matches!(handler.handle(Frame::command(["GET", "scores"])), Frame::Error(_)));
        assert!(matches!(handler.handle(Frame::command(["FLUSHALL"])), Frame::Error(_)));
        assert!(matches!(handler.handle(Frame::Simple("GET".into())), Frame::Error(_)));
        assert!(matches!(handler.handle(Frame::command(["PEERS"])), Frame::Error(_)));
    }

    #[test]
    fn test_peers_replaces_ring() {
        let rt = Runtime::new().unwrap();
        let handler = handler(&rt);

        let reply = handler.handle(Frame::command(["PEERS", SELF, "127.0.0.1:7002"]));
        assert_eq!(reply, Frame::Simple("OK".into()));
        assert_eq!(handler.pool.peers(), [SELF, "127.0.0.1:7002"]);
    }

    #[test]
    fn test_info_reports_stats() {
        let rt = Runtime::new().unwrap();
        let handler = handler(&rt);
        handler.handle(Frame::command(["GET", "scores", "Tom"]));
        handler.handle(Frame::command(["GET", "scores", "Tom"]));

        let info = handler.handle(Frame::command(["INFO", "scores"])).into_bulk().unwrap();
        let info = String::from_utf8(info).unwrap();
        assert!(info.contains("# Group scores"));
        assert!(info.contains("hits:1\r\n"));
        assert!(info.contains("local_loads:1\r\n"));
        assert!(info.contains(&format!("self:{SELF}")));
    }
}
