use mio::Poll;

use originserv::config;
use originserv::error::Result;
use originserv::server::Server;
use originserv::signals;

const DEFAULT_CONFIG_PATH: &str = "./conf/default.conf";

fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let app_config = config::load(&config_path)?;
    config::display_config(&app_config.servers);

    let poll = Poll::new()?;
    let mut server = Server::new(app_config, &poll)?;
    signals::install(server.shutdown_flag())?;

    server.run(poll)
}
