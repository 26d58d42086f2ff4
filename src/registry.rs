// Built-in handler registry

use crate::handlers::*;

pub fn register_all(registry: &mut HandlerRegistry) {
    registry.register("HelloWorker", || Box::new(HelloWorker));
    registry.register("EchoParams", || Box::new(EchoParams));
    registry.register("SumWorker", || Box::new(SumWorker));
    registry.register("BgColorWorker", || Box::new(BgColorWorker));
    registry.register("Home", || Box::new(Home));
}
