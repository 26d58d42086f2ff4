use super::bg_color::BG_COLOR_PARAM;
use super::WebWorker;
use crate::context::RequestContext;

pub const HOME_PAGE: &str = "/private/pages/home.smscr";
pub const DEFAULT_BACKGROUND: &str = "7F7F7F";

/// Renders the home page with the session's background color.
pub struct Home;

impl WebWorker for Home {
    fn process_request(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        let background = ctx
            .persistent_parameter(BG_COLOR_PARAM)
            .unwrap_or_else(|| DEFAULT_BACKGROUND.to_string());
        ctx.set_temporary_parameter("background", background);
        ctx.dispatch(HOME_PAGE)?;
        Ok(())
    }
}
