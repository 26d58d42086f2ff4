use super::{escape_html, WebWorker};
use crate::context::RequestContext;

/// Greets the `name` query parameter and reports how long it is.
pub struct HelloWorker;

impl WebWorker for HelloWorker {
    fn process_request(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        ctx.set_mime_type("text/html")?;
        let body = match ctx.parameter("name").map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => format!(
                "<html><body><h1>Hello {}!</h1><p>Your name has {} letters.</p></body></html>",
                escape_html(name),
                name.chars().count()
            ),
            None => "<html><body><h1>Hello!</h1><p>You did not send a name.</p></body></html>"
                .to_string(),
        };
        ctx.write_str(&body)?;
        Ok(())
    }
}
