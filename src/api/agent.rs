//! Request disguise helpers
//!
//! Picks user agents and mainland-China client addresses so outbound
//! requests look like the traffic each catalog expects.

use rand::Rng;
use std::net::Ipv4Addr;

pub const LINUX_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/60.0.3112.90 Safari/537.36";

const USER_AGENT_LIST: [&str; 14] = [
    "Mozilla/5.0 (iPhone; CPU iPhone OS 9_1 like Mac OS X) AppleWebKit/601.1.46 (KHTML, like Gecko) Version/9.0 Mobile/13B143 Safari/601.1",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 9_1 like Mac OS X) AppleWebKit/601.1.46 (KHTML, like Gecko) Version/9.0 Mobile/13B143 Safari/601.1",
    "Mozilla/5.0 (Linux; Android 5.0; SM-G900P Build/LRX21T) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/59.0.3071.115 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 6.0; Nexus 5 Build/MRA58N) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/59.0.3071.115 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 5.1.1; Nexus 6 Build/LYZ28E) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/59.0.3071.115 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 10_3_2 like Mac OS X) AppleWebKit/603.2.4 (KHTML, like Gecko) Mobile/14F89;GameHelper",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 10_0 like Mac OS X) AppleWebKit/602.1.38 (KHTML, like Gecko) Version/10.0 Mobile/14A300 Safari/602.1",
    "Mozilla/5.0 (iPad; CPU OS 10_0 like Mac OS X) AppleWebKit/602.1.38 (KHTML, like Gecko) Version/10.0 Mobile/14A300 Safari/602.1",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.12; rv:46.0) Gecko/20100101 Firefox/46.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_12_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/59.0.3071.115 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_12_5) AppleWebKit/603.2.4 (KHTML, like Gecko) Version/10.1.1 Safari/603.2.4",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:46.0) Gecko/20100101 Firefox/46.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/51.0.2704.103 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/42.0.2311.135 Safari/537.36 Edge/13.1058",
];

/// Mainland address blocks, inclusive
const CHINA_IP_RANGES: [(Ipv4Addr, Ipv4Addr); 6] = [
    (Ipv4Addr::new(58, 14, 0, 0), Ipv4Addr::new(58, 25, 255, 255)),
    (Ipv4Addr::new(60, 0, 0, 0), Ipv4Addr::new(60, 31, 255, 255)),
    (Ipv4Addr::new(101, 16, 0, 0), Ipv4Addr::new(101, 47, 255, 255)),
    (Ipv4Addr::new(112, 0, 0, 0), Ipv4Addr::new(112, 63, 255, 255)),
    (Ipv4Addr::new(116, 1, 0, 0), Ipv4Addr::new(116, 31, 255, 255)),
    (Ipv4Addr::new(183, 0, 0, 0), Ipv4Addr::new(183, 63, 255, 255)),
];

/// Pick a user agent for a client profile
///
/// `"mobile"` and `"pc"` select from the matching half of the list, any other
/// non-empty string is used verbatim, and an empty string picks from all.
pub fn choose_user_agent(ua: &str) -> &str {
    let index = if ua == "mobile" {
        rand::random::<u16>() % 7
    } else if ua == "pc" {
        rand::random::<u16>() % 5 + 8
    } else if !ua.is_empty() {
        return ua;
    } else {
        rand::random::<u16>() % USER_AGENT_LIST.len() as u16
    };
    USER_AGENT_LIST[index as usize]
}

pub fn choose_china_ip() -> String {
    let mut rng = rand::rng();
    let (start, end) = CHINA_IP_RANGES[rng.random_range(0..CHINA_IP_RANGES.len())];
    let ip = rng.random_range(u32::from(start)..=u32::from(end));
    Ipv4Addr::from(ip).to_string()
}
