use std::fmt::Write as _;

use super::{escape_html, WebWorker};
use crate::context::RequestContext;

/// Lists every query parameter in an HTML table, sorted by name.
pub struct EchoParams;

impl WebWorker for EchoParams {
    fn process_request(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        ctx.set_mime_type("text/html")?;
        let mut body = String::from(
            "<html><body><table border=\"1\"><tr><th>Name</th><th>Value</th></tr>",
        );
        for name in ctx.parameter_names() {
            let value = ctx.parameter(name).unwrap_or_default();
            write!(
                body,
                "<tr><td>{}</td><td>{}</td></tr>",
                escape_html(name),
                escape_html(value)
            )?;
        }
        body.push_str("</table></body></html>");
        ctx.write_str(&body)?;
        Ok(())
    }
}
