use anyhow::Result;
use sitedash_core::config::DashboardConfig;

pub fn run(config: DashboardConfig, port: u16, open_browser: bool) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let actual_port = listener.local_addr()?.port();
        println!(
            "sitedash serving {} on http://localhost:{actual_port}",
            config.work_dir.display()
        );

        tokio::select! {
            res = sitedash_server::serve_on(config, listener, open_browser) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })
}
