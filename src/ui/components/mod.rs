mod notices;

pub use notices::{draw_install_prompt, draw_offline_indicator, draw_update_banner};
