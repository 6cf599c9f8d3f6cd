use std::sync::Once;

use crate::args::Args;

static INIT: Once = Once::new();

pub fn init(args: &Args) {
    INIT.call_once(|| {
        env_logger::Builder::new()
            .parse_filters(&args.log_filter)
            .init();
    });
}
