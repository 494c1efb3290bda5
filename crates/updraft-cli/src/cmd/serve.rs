use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;
use updraft_server::auth::AdminCredentials;
use updraft_server::ServerConfig;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on (0 = OS-assigned)
    #[arg(long, env = "PORT", default_value = "10000")]
    pub port: u16,

    /// Directory holding published artifacts and force flags
    #[arg(long, env = "FILES_DIR", default_value = "files")]
    pub files_dir: PathBuf,

    /// Report database (default: in memory)
    #[arg(long = "db", env = "UPDRAFT_DB")]
    pub db: Option<PathBuf>,

    /// Admin user for /admin routes
    #[arg(long, env = "ADMIN_USER")]
    pub admin_user: Option<String>,

    /// Admin password for /admin routes
    #[arg(long, env = "ADMIN_PASS", hide_env_values = true)]
    pub admin_pass: Option<String>,
}

impl ServeArgs {
    fn server_config(self) -> Result<ServerConfig> {
        let admin = match (self.admin_user, self.admin_pass) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some(AdminCredentials { user, pass })
            }
            (None, None) => None,
            _ => bail!("--admin-user and --admin-pass must be given together"),
        };
        if admin.is_none() {
            tracing::warn!("no admin credentials configured; /admin routes are disabled");
        }
        Ok(ServerConfig {
            files_dir: self.files_dir,
            db_path: self.db,
            admin,
        })
    }
}

pub fn run(args: ServeArgs) -> Result<()> {
    let port = args.port;
    let config = args.server_config()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let actual_port = listener.local_addr()?.port();
        println!(
            "updraft delivery server → http://localhost:{actual_port}  (PID {})",
            std::process::id()
        );

        tokio::select! {
            res = updraft_server::serve_on(config, listener) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(user: Option<&str>, pass: Option<&str>) -> ServeArgs {
        ServeArgs {
            port: 0,
            files_dir: PathBuf::from("files"),
            db: None,
            admin_user: user.map(String::from),
            admin_pass: pass.map(String::from),
        }
    }

    #[test]
    fn credentials_are_optional() {
        assert!(args(None, None).server_config().unwrap().admin.is_none());
        let cfg = args(Some("admin"), Some("pw")).server_config().unwrap();
        assert_eq!(cfg.admin.unwrap().user, "admin");
    }

    #[test]
    fn half_configured_credentials_are_rejected() {
        assert!(args(Some("admin"), None).server_config().is_err());
        assert!(args(Some(""), Some("pw")).server_config().is_err());
    }
}
