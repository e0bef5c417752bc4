#[cfg(feature = "cli")]
pub mod cli;

use crate::utils::error::{Result, StackError};
use crate::utils::validation::{
    validate_health_path, validate_non_empty_string, validate_path, validate_region, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Whole stack definition. Every section falls back to the analytics stack defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub stack: StackInfo,
    pub network: NetworkConfig,
    pub security: SecurityConfig,
    pub cluster: ClusterConfig,
    pub task: TaskConfig,
    pub containers: ContainersConfig,
    pub service: ServiceConfig,
    pub load_balancer: LoadBalancerConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackInfo {
    pub name: String,
    pub region: String,
    pub description: String,
}

impl Default for StackInfo {
    fn default() -> Self {
        Self {
            name: "MatomoFargateStack".to_string(),
            region: "us-east-1".to_string(),
            description: "Matomo analytics on Fargate (NGINX + PHP-FPM) behind an ALB".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub id: String,
    pub max_azs: u8,
    pub cidr: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            id: "MatomoVpc".to_string(),
            max_azs: 2,
            cidr: "10.0.0.0/16".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityGroupConfig {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// 對外開放 proxy port 的群組
    pub proxy: SecurityGroupConfig,
    /// 只接受 proxy 群組流量的群組
    pub app: SecurityGroupConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            proxy: SecurityGroupConfig {
                id: "WebSG".to_string(),
                description: "Allow HTTP".to_string(),
            },
            app: SecurityGroupConfig {
                id: "AppSG".to_string(),
                description: "Allow PHP-FPM from NGINX".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub id: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            id: "MatomoCluster".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub id: String,
    pub cpu: u32,
    pub memory_mib: u32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            id: "MatomoTaskDef".to_string(),
            cpu: 512,
            memory_mib: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    pub name: String,
    pub image: String,
    pub memory_mib: u32,
    pub port: u16,
    pub essential: bool,
    pub log_group_id: String,
    pub log_stream_prefix: String,
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
}

fn default_log_retention_days() -> u32 {
    7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainersConfig {
    pub proxy: ContainerConfig,
    pub app: ContainerConfig,
}

impl Default for ContainersConfig {
    fn default() -> Self {
        Self {
            proxy: ContainerConfig {
                name: "MatomoNginx".to_string(),
                image: "./nginx".to_string(),
                memory_mib: 512,
                port: 80,
                essential: true,
                log_group_id: "MatomoNginxLogGroup".to_string(),
                log_stream_prefix: "MatomoNginxLogs".to_string(),
                log_retention_days: default_log_retention_days(),
            },
            app: ContainerConfig {
                name: "MatomoPHPFPM".to_string(),
                image: "./matomo".to_string(),
                memory_mib: 512,
                port: 9000,
                essential: true,
                log_group_id: "MatomoPHPFPMLogGroup".to_string(),
                log_stream_prefix: "MatomoPHPFPMLogs".to_string(),
                log_retention_days: default_log_retention_days(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub id: String,
    pub desired_count: u32,
    pub assign_public_ip: bool,
    /// References, resolved by the graph builder.
    pub cluster: String,
    pub task_definition: String,
    pub security_group: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            id: "MatomoFargateService".to_string(),
            desired_count: 1,
            assign_public_ip: true,
            cluster: "MatomoCluster".to_string(),
            task_definition: "MatomoTaskDef".to_string(),
            security_group: "AppSG".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub id: String,
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            id: "MatomoListener".to_string(),
            port: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub id: String,
    pub service: String,
    pub container: String,
    pub port: u16,
    pub health_check_path: String,
    pub health_check_interval_secs: u32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            id: "MatomoTarget".to_string(),
            service: "MatomoFargateService".to_string(),
            container: "MatomoNginx".to_string(),
            port: 80,
            health_check_path: "/matomo.php".to_string(),
            health_check_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    pub id: String,
    pub internet_facing: bool,
    pub security_group: String,
    pub listener: ListenerConfig,
    pub target: TargetConfig,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            id: "MatomoALB".to_string(),
            internet_facing: true,
            security_group: "WebSG".to_string(),
            listener: ListenerConfig::default(),
            target: TargetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub id: String,
    pub description: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            id: "MatomoURL".to_string(),
            description: Some("Public URL of the Matomo load balancer".to_string()),
        }
    }
}

impl StackConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${IMAGE_ROOT})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| StackError::config("env_substitution", e.to_string()))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn container_configs(&self) -> [(&'static str, &ContainerConfig); 2] {
        [
            ("containers.proxy", &self.containers.proxy),
            ("containers.app", &self.containers.app),
        ]
    }
}

impl Validate for StackConfig {
    /// Syntactic checks only; bounds and references are enforced by the graph builder.
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("stack.name", &self.stack.name)?;
        validate_region("stack.region", &self.stack.region)?;
        validate_non_empty_string("network.cidr", &self.network.cidr)?;

        for (field, container) in self.container_configs() {
            validate_path(&format!("{}.image", field), &container.image)?;
            if Path::new(&container.image).is_absolute() {
                return Err(StackError::config(
                    &format!("{}.image", field),
                    format!(
                        "Image build context '{}' must be relative to the stack config",
                        container.image
                    ),
                ));
            }
            validate_non_empty_string(
                &format!("{}.log_stream_prefix", field),
                &container.log_stream_prefix,
            )?;
        }

        validate_health_path(
            "load_balancer.target.health_check_path",
            &self.load_balancer.target.health_check_path,
        )?;

        Ok(())
    }
}
