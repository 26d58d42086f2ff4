use super::{escape_html, WebWorker};
use crate::context::RequestContext;

/// Name of the persistent parameter holding the page background.
pub const BG_COLOR_PARAM: &str = "bgcolor";

/// Stores a 6-digit hex `bgcolor` in the session.
pub struct BgColorWorker;

pub fn is_hex_color(value: &str) -> bool {
    value.len() == 6 && value.chars().all(|c| c.is_ascii_hexdigit())
}

impl WebWorker for BgColorWorker {
    fn process_request(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        ctx.set_mime_type("text/html")?;
        let requested = ctx.parameter(BG_COLOR_PARAM).map(str::to_string);
        let message = match requested {
            Some(color) if is_hex_color(&color) => {
                let color = color.to_ascii_uppercase();
                ctx.set_persistent_parameter(BG_COLOR_PARAM, color.as_str());
                format!("Background color set to #{color}.")
            }
            Some(color) => format!("`{}` is not a valid color.", escape_html(&color)),
            None => "No color given.".to_string(),
        };
        ctx.write_str(&format!(
            "<html><body><p>{message}</p><p><a href=\"/index2.html\">Back home</a></p></body></html>"
        ))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::is_hex_color;

    #[test]
    fn test_hex_color_validation() {
        assert!(is_hex_color("00ff7F"));
        assert!(!is_hex_color("00ff7"));
        assert!(!is_hex_color("00ff7G"));
    }
}
