#![allow(dead_code)]

pub mod test_server {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x10000);
        });
    }
}

pub mod webroot {
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    pub const LOOP_SCRIPT: &str = "{$ FOR i 1 3 $}{$= i $},{$END$}";
    pub const PARAM_SCRIPT: &str = "Hi {$= \"name\" \"anon\" @paramGet $}";
    pub const COUNTER_SCRIPT: &str = "{$= \"n\" \"0\" @pparamGet 1 + \"n\" @pparamSet \"\" $}count={$= \"n\" \"0\" @pparamGet $}";
    pub const CALC_PAGE: &str = "{$= \"varA\" \"?\" @tparamGet $}+{$= \"varB\" \"?\" @tparamGet $}={$= \"zbroj\" \"?\" @tparamGet $} {$= \"imgName\" \"\" @tparamGet $}";
    pub const HOME_PAGE: &str = "bg={$= \"background\" \"\" @tparamGet $}";

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    /// Scratch document root with static files, public scripts and the
    /// private pages used by the built-in handlers.
    pub fn build() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "index.html", "<h1>Index</h1>");
        write(root, "hello.txt", "Hello\n");
        write(root, "README", "no extension");
        write(root, "scripts/loop.smscr", LOOP_SCRIPT);
        write(root, "scripts/params.smscr", PARAM_SCRIPT);
        write(root, "scripts/counter.smscr", COUNTER_SCRIPT);
        write(root, "scripts/broken.smscr", "{$ FOR i 1 $}never closed");
        write(root, "scripts/unknown.smscr", "{$= missing $}");
        write(root, "scripts/late_error.smscr", "partial{$= missing $}");
        write(root, "empty.txt", "");
        write(root, "scripts/empty.smscr", "");
        write(root, "scripts/no_rows.smscr", "{$ FOR i 1 0 $}row{$END$}");
        write(root, "private/pages/calc.smscr", CALC_PAGE);
        write(root, "private/pages/home.smscr", HOME_PAGE);
        write(root, "private/secret.txt", "secret");
        fs::create_dir_all(root.join("emptydir")).unwrap();
        dir
    }
}

pub mod http {
    use std::collections::HashMap;
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    #[derive(Debug)]
    pub struct Response {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: String,
    }

    impl Response {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }

        pub fn set_cookies(&self) -> Vec<&str> {
            self.headers
                .iter()
                .filter(|(n, _)| n.eq_ignore_ascii_case("set-cookie"))
                .map(|(_, v)| v.as_str())
                .collect()
        }

        /// Value of the `sid` cookie set by this response, quotes removed.
        pub fn session_id(&self) -> Option<String> {
            self.set_cookies().into_iter().find_map(|c| {
                let first = c.split(';').next()?;
                let value = first.strip_prefix("sid=")?;
                Some(value.trim_matches('"').to_string())
            })
        }
    }

    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut buf = Vec::new();
        loop {
            let mut tmp = [0u8; 1024];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&tmp[..n]),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {:?}", e),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    pub fn get(addr: &SocketAddr, path: &str, cookie: Option<&str>) -> Response {
        let mut req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n");
        if let Some(sid) = cookie {
            req.push_str(&format!("Cookie: sid=\"{sid}\"\r\n"));
        }
        req.push_str("\r\n");
        parse_response(&send_request(addr, &req))
    }

    pub fn parse_response(resp: &str) -> Response {
        let (head, body) = resp.split_once("\r\n\r\n").unwrap_or((resp, ""));
        let mut lines = head.lines();
        let status = lines
            .next()
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let headers = lines
            .filter_map(|l| l.split_once(':'))
            .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
            .collect();
        Response {
            status,
            headers,
            body: body.to_string(),
        }
    }

    pub fn workers_table() -> HashMap<String, String> {
        HashMap::from([
            ("/hello".to_string(), "demo.workers.HelloWorker".to_string()),
            ("/calc".to_string(), "SumWorker".to_string()),
            ("/home".to_string(), "Home".to_string()),
        ])
    }
}

pub mod sink {
    use parking_lot::Mutex;
    use smartserve::context::{new_shared_params, RequestContext, SharedParams};
    use std::collections::HashMap;
    use std::io::{self, Write};
    use std::sync::Arc;

    /// Cloneable in-memory writer; clones share the buffer.
    #[derive(Clone, Default)]
    pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).to_string()
        }

        /// Everything after the header block.
        pub fn body(&self) -> String {
            let all = self.contents();
            match all.split_once("\r\n\r\n") {
                Some((_, body)) => body.to_string(),
                None => String::new(),
            }
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    pub fn context_with(params: &[(&str, &str)], persistent: SharedParams) -> (RequestContext, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let params: HashMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let ctx = RequestContext::new(Box::new(buffer.clone()), params, persistent, Vec::new());
        (ctx, buffer)
    }

    pub fn context() -> (RequestContext, SharedBuffer) {
        context_with(&[], new_shared_params())
    }
}
