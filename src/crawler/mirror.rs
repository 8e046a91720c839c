use rand::seq::IndexedRandom;
use url::Url;

use crate::models::MirrorServer;

/// 把镜像服务器的 path 解析成主机名，缺少协议时按 https 处理
fn server_host(server: &MirrorServer) -> Option<String> {
    let parsed = Url::parse(&server.path)
        .or_else(|_| Url::parse(&format!("https://{}", server.path.trim_start_matches('/'))))
        .ok()?;
    parsed.host_str().map(str::to_owned)
}

/// 与失败地址主机不同的候选主机，去重并保持服务器列表顺序
pub fn alternate_hosts(image_url: &Url, servers: &[MirrorServer]) -> Vec<String> {
    let current = image_url.host_str().unwrap_or_default();
    let mut hosts: Vec<String> = Vec::new();
    for host in servers.iter().filter_map(server_host) {
        if host != current && !hosts.contains(&host) {
            hosts.push(host);
        }
    }
    hosts
}

/// 随机挑一个其他主机替换失败图片的主机，路径和查询参数保持不变。
/// 没有可用的其他主机时返回 `None`。
pub fn alternate_url(image_url: &Url, servers: &[MirrorServer]) -> Option<Url> {
    let hosts = alternate_hosts(image_url, servers);
    let host = hosts.choose(&mut rand::rng())?;

    let mut url = image_url.clone();
    url.set_host(Some(host.as_str())).ok()?;
    Some(url)
}
