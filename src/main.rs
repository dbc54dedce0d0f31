//! Binary entrypoint that launches the shop assistant server.

use std::process::ExitCode;

use shop_chat_assistant::start_shop_assistant;

/// Start the HTTP server serving the chat page and relay API.
fn main() -> ExitCode {
    start_shop_assistant::run()
}
