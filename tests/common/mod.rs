#![allow(dead_code)]

use autoroute::handlers::{HandlerContext, HandlerError, HandlerOutcome, HandlerTable};
use serde_json::json;

/// Handlers shared by the integration tests
pub fn test_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();
    autoroute::echo::register_builtin_handlers(&mut table);
    table.register("app.ping", |_: &HandlerContext| {
        Ok::<_, HandlerError>(HandlerOutcome::json(json!({"pong": true})))
    });
    table.register("app.echo", |ctx: &HandlerContext| {
        Ok::<_, HandlerError>(HandlerOutcome::json(json!({
            "user": ctx.user(),
            "params": ctx.params.to_json(),
        })))
    });
    table.register("app.process", |ctx: &HandlerContext| {
        match ctx.params.get_str("process_id") {
            Some("known") => Ok(HandlerOutcome::json(json!({"process_id": "known", "state": "running"}))),
            Some(other) => Err(HandlerError::NotFound(format!("no process '{other}'"))),
            None => Err(HandlerError::BadRequest("process_id missing".into())),
        }
    });
    table.register("app.boom", |_: &HandlerContext| -> Result<HandlerOutcome, HandlerError> {
        panic!("handler exploded")
    });
    table.register("app.teapot", |_: &HandlerContext| {
        Ok::<_, HandlerError>(HandlerOutcome::json(json!({"short": "stout"})).with_status(418))
    });
    table.register("app.download", |ctx: &HandlerContext| {
        let name = ctx.params.get_str("name").unwrap_or("report").to_string();
        Ok::<_, HandlerError>(
            HandlerOutcome::binary("application/pdf", b"%PDF-1.4".to_vec())
                .with_filename(format!("{name}.pdf")),
        )
    });
    table
}

pub mod tokens {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    /// HS256 token for `sub`, signed with `secret`
    pub fn bearer(sub: &str, secret: &str) -> String {
        encode(
            &Header::default(),
            &json!({"sub": sub}),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }
}

pub mod config_dir {
    use std::fs;
    use tempfile::TempDir;

    /// Temporary endpoint directory holding the given `(file name, yaml)` pairs
    pub fn with_files(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }
}

pub mod test_server {
    use autoroute::server::{AppService, HttpServer, ServerHandle};
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::sync::Once;
    use std::time::Duration;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }

    /// Running server that is stopped when dropped
    pub struct TestServer {
        handle: Option<ServerHandle>,
        pub addr: SocketAddr,
    }

    impl TestServer {
        pub fn start(service: AppService) -> Self {
            setup_may_runtime();
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);
            let handle = HttpServer(service).start(addr).unwrap();
            handle.wait_ready().unwrap();
            Self {
                handle: Some(handle),
                addr,
            }
        }

        pub fn send(&self, raw: &str) -> TestResponse {
            TestResponse::parse(&send_request(&self.addr, raw.as_bytes()))
        }

        pub fn get(&self, target: &str, headers: &[(&str, &str)]) -> TestResponse {
            let mut raw = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n");
            for (k, v) in headers {
                raw.push_str(&format!("{k}: {v}\r\n"));
            }
            raw.push_str("Connection: close\r\n\r\n");
            self.send(&raw)
        }

        pub fn post(&self, target: &str, headers: &[(&str, &str)], body: &[u8]) -> TestResponse {
            let mut raw = format!(
                "POST {target} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n",
                body.len()
            )
            .into_bytes();
            for (k, v) in headers {
                raw.extend_from_slice(format!("{k}: {v}\r\n").as_bytes());
            }
            raw.extend_from_slice(b"Connection: close\r\n\r\n");
            raw.extend_from_slice(body);
            TestResponse::parse(&send_request(&self.addr, &raw))
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            if let Some(handle) = self.handle.take() {
                handle.stop();
            }
        }
    }

    pub fn send_request(addr: &SocketAddr, req: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let mut buf = Vec::new();
        loop {
            let mut tmp = [0u8; 4096];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&tmp[..n]);
                    if TestResponse::is_complete(&buf) {
                        break;
                    }
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {e:?}"),
            }
        }
        buf
    }

    #[derive(Debug)]
    pub struct TestResponse {
        pub status: u16,
        /// Lowercased header names
        pub headers: HashMap<String, String>,
        pub body: Vec<u8>,
    }

    impl TestResponse {
        fn split(raw: &[u8]) -> Option<(&[u8], &[u8])> {
            raw.windows(4)
                .position(|w| w == b"\r\n\r\n")
                .map(|pos| (&raw[..pos], &raw[pos + 4..]))
        }

        fn content_length(head: &[u8]) -> Option<usize> {
            String::from_utf8_lossy(head).lines().find_map(|line| {
                let (k, v) = line.split_once(':')?;
                if k.trim().eq_ignore_ascii_case("content-length") {
                    v.trim().parse().ok()
                } else {
                    None
                }
            })
        }

        fn is_complete(raw: &[u8]) -> bool {
            match Self::split(raw) {
                Some((head, body)) => Self::content_length(head).is_some_and(|n| body.len() >= n),
                None => false,
            }
        }

        pub fn parse(raw: &[u8]) -> Self {
            let (head, body) = Self::split(raw).unwrap_or((raw, &[]));
            let head = String::from_utf8_lossy(head);
            let mut lines = head.lines();
            let status = lines
                .next()
                .and_then(|l| l.split_whitespace().nth(1))
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            let headers = lines
                .filter_map(|l| l.split_once(':'))
                .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
                .collect();
            Self {
                status,
                headers,
                body: body.to_vec(),
            }
        }

        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap_or_default()
        }

        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }
}
