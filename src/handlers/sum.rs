use super::WebWorker;
use crate::context::RequestContext;

/// Page rendered after the sum is computed.
pub const CALC_PAGE: &str = "/private/pages/calc.smscr";

const DEFAULT_A: i64 = 1;
const DEFAULT_B: i64 = 2;

/// Adds query parameters `a` and `b` and hands the result to a script.
///
/// Missing or non-numeric operands fall back to 1 and 2. The script sees
/// `varA`, `varB`, `zbroj` (the sum) and `imgName` as temporary parameters.
pub struct SumWorker;

fn operand(ctx: &RequestContext, name: &str, default: i64) -> i64 {
    ctx.parameter(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl WebWorker for SumWorker {
    fn process_request(&self, ctx: &mut RequestContext) -> anyhow::Result<()> {
        let a = operand(ctx, "a", DEFAULT_A);
        let b = operand(ctx, "b", DEFAULT_B);
        let sum = a
            .checked_add(b)
            .ok_or_else(|| anyhow::anyhow!("{a} + {b} overflows"))?;

        ctx.set_temporary_parameter("varA", a.to_string());
        ctx.set_temporary_parameter("varB", b.to_string());
        ctx.set_temporary_parameter("zbroj", sum.to_string());
        let image = if sum % 2 == 0 { "even.png" } else { "odd.png" };
        ctx.set_temporary_parameter("imgName", image);

        ctx.dispatch(CALC_PAGE)?;
        Ok(())
    }
}
