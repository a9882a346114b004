use std::time::Duration;

use aryn::bridge::Port;
use aryn::{Broadcast, Channel};

fn close_all(ports: &[&dyn Port<String>]) {
    for port in ports {
        port.close();
    }
}

#[aryn::start]
fn main() {
    let channel = Channel::bounded(1);
    let broadcast = Broadcast::new(Duration::from_millis(1));

    close_all(&[&channel, &broadcast]);

    assert!(channel.is_closed() && broadcast.is_closed());
}
