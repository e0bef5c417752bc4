use crate::utils::error::Result;
use crate::utils::validation::validate_identifier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical identifier of a resource inside one stack.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_identifier(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id of a resource rendered on behalf of this one (subnets, roles, ...).
    pub fn child(&self, suffix: &str) -> String {
        format!("{}{}", self.0, suffix)
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ResourceKind {
    Network,
    SecurityGroup,
    Cluster,
    LogGroup,
    TaskDefinition,
    Service,
    LoadBalancer,
    Listener,
    TargetGroup,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Network => "network",
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::Cluster => "cluster",
            ResourceKind::LogGroup => "log-group",
            ResourceKind::TaskDefinition => "task-definition",
            ResourceKind::Service => "service",
            ResourceKind::LoadBalancer => "load-balancer",
            ResourceKind::Listener => "listener",
            ResourceKind::TargetGroup => "target-group",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSpec {
    pub id: ResourceId,
    pub max_azs: u8,
    pub cidr: String,
    /// One public subnet per zone, derived from `cidr`.
    pub subnet_cidrs: Vec<String>,
}

impl NetworkSpec {
    pub fn gateway_id(&self) -> String {
        self.id.child("IGW")
    }

    pub fn gateway_attachment_id(&self) -> String {
        self.id.child("VPCGW")
    }

    /// `<vpc>PublicSubnet<n>`, n counted from 1.
    pub fn public_subnet_prefix(&self, zone: usize) -> String {
        self.id.child(&format!("PublicSubnet{}", zone + 1))
    }

    pub fn public_subnet_ids(&self) -> Vec<String> {
        self.zone_ids("Subnet")
    }

    pub fn public_default_route_ids(&self) -> Vec<String> {
        self.zone_ids("DefaultRoute")
    }

    fn zone_ids(&self, suffix: &str) -> Vec<String> {
        (0..self.subnet_cidrs.len())
            .map(|zone| format!("{}{}", self.public_subnet_prefix(zone), suffix))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Peer {
    AnyIpv4,
    SecurityGroup(ResourceId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Protocol {
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngressRule {
    pub peer: Peer,
    pub protocol: Protocol,
    pub port: u16,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityGroupSpec {
    pub id: ResourceId,
    pub description: String,
    pub network: ResourceId,
    pub ingress: Vec<IngressRule>,
}

impl SecurityGroupSpec {
    /// Group-to-group rules render as standalone ingress resources.
    pub fn peer_rule_id(&self, rule: &IngressRule) -> Option<String> {
        match &rule.peer {
            Peer::AnyIpv4 => None,
            Peer::SecurityGroup(peer) => Some(format!("{}From{}{}", self.id, peer, rule.port)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSpec {
    pub id: ResourceId,
    pub network: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogGroupSpec {
    pub id: ResourceId,
    pub retention_days: u32,
}

/// Container image built from a local directory by an external build step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageAsset {
    pub path: String,
    /// Template parameter that receives the pushed image URI.
    pub parameter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogDestination {
    pub log_group: ResourceId,
    pub stream_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerSpec {
    pub name: ResourceId,
    pub image: ImageAsset,
    pub memory_mib: u32,
    pub port: u16,
    pub essential: bool,
    pub log: LogDestination,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSpec {
    pub id: ResourceId,
    pub cpu: u32,
    pub memory_mib: u32,
    /// Always `[proxy, app]`.
    pub containers: Vec<ContainerSpec>,
}

impl TaskSpec {
    pub fn container(&self, name: &ResourceId) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| &c.name == name)
    }

    pub fn total_container_memory(&self) -> u32 {
        self.containers.iter().map(|c| c.memory_mib).sum()
    }

    pub fn execution_role_id(&self) -> String {
        self.id.child("ExecutionRole")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSpec {
    pub id: ResourceId,
    pub network: ResourceId,
    pub cluster: ResourceId,
    pub task_definition: ResourceId,
    pub security_group: ResourceId,
    pub desired_count: u32,
    pub assign_public_ip: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadBalancerSpec {
    pub id: ResourceId,
    pub network: ResourceId,
    pub security_group: ResourceId,
    pub internet_facing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheck {
    pub path: String,
    pub interval_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetGroupSpec {
    pub id: ResourceId,
    pub network: ResourceId,
    pub service: ResourceId,
    pub task_definition: ResourceId,
    pub container: ResourceId,
    pub port: u16,
    pub health_check: HealthCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListenerSpec {
    pub id: ResourceId,
    pub load_balancer: ResourceId,
    pub port: u16,
    pub target_group: ResourceId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Resource {
    Network(NetworkSpec),
    SecurityGroup(SecurityGroupSpec),
    Cluster(ClusterSpec),
    LogGroup(LogGroupSpec),
    TaskDefinition(TaskSpec),
    Service(ServiceSpec),
    LoadBalancer(LoadBalancerSpec),
    Listener(ListenerSpec),
    TargetGroup(TargetGroupSpec),
}

impl Resource {
    pub fn id(&self) -> &ResourceId {
        match self {
            Resource::Network(r) => &r.id,
            Resource::SecurityGroup(r) => &r.id,
            Resource::Cluster(r) => &r.id,
            Resource::LogGroup(r) => &r.id,
            Resource::TaskDefinition(r) => &r.id,
            Resource::Service(r) => &r.id,
            Resource::LoadBalancer(r) => &r.id,
            Resource::Listener(r) => &r.id,
            Resource::TargetGroup(r) => &r.id,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Network(_) => ResourceKind::Network,
            Resource::SecurityGroup(_) => ResourceKind::SecurityGroup,
            Resource::Cluster(_) => ResourceKind::Cluster,
            Resource::LogGroup(_) => ResourceKind::LogGroup,
            Resource::TaskDefinition(_) => ResourceKind::TaskDefinition,
            Resource::Service(_) => ResourceKind::Service,
            Resource::LoadBalancer(_) => ResourceKind::LoadBalancer,
            Resource::Listener(_) => ResourceKind::Listener,
            Resource::TargetGroup(_) => ResourceKind::TargetGroup,
        }
    }

    /// Template logical ids (resources and parameters) this resource expands
    /// into besides its own id.
    pub fn derived_ids(&self) -> Vec<String> {
        match self {
            Resource::Network(net) => {
                let mut ids = vec![net.gateway_id(), net.gateway_attachment_id()];
                for zone in 0..net.subnet_cidrs.len() {
                    let prefix = net.public_subnet_prefix(zone);
                    for suffix in ["Subnet", "RouteTable", "RouteTableAssociation", "DefaultRoute"] {
                        ids.push(format!("{}{}", prefix, suffix));
                    }
                }
                ids
            }
            Resource::SecurityGroup(sg) => sg
                .ingress
                .iter()
                .filter_map(|rule| sg.peer_rule_id(rule))
                .collect(),
            Resource::TaskDefinition(task) => {
                let mut ids = vec![task.execution_role_id()];
                ids.extend(task.containers.iter().map(|c| c.image.parameter.clone()));
                ids
            }
            Resource::Cluster(_)
            | Resource::LogGroup(_)
            | Resource::Service(_)
            | Resource::LoadBalancer(_)
            | Resource::Listener(_)
            | Resource::TargetGroup(_) => Vec::new(),
        }
    }

    /// Other resources this one points at, each paired with the kind it must have.
    pub fn references(&self) -> Vec<(&ResourceId, ResourceKind)> {
        match self {
            Resource::Network(_) | Resource::LogGroup(_) => Vec::new(),
            Resource::SecurityGroup(sg) => {
                let mut refs = vec![(&sg.network, ResourceKind::Network)];
                for rule in &sg.ingress {
                    if let Peer::SecurityGroup(peer) = &rule.peer {
                        refs.push((peer, ResourceKind::SecurityGroup));
                    }
                }
                refs
            }
            Resource::Cluster(c) => vec![(&c.network, ResourceKind::Network)],
            Resource::TaskDefinition(task) => task
                .containers
                .iter()
                .map(|c| (&c.log.log_group, ResourceKind::LogGroup))
                .collect(),
            Resource::Service(svc) => vec![
                (&svc.network, ResourceKind::Network),
                (&svc.cluster, ResourceKind::Cluster),
                (&svc.task_definition, ResourceKind::TaskDefinition),
                (&svc.security_group, ResourceKind::SecurityGroup),
            ],
            Resource::LoadBalancer(lb) => vec![
                (&lb.network, ResourceKind::Network),
                (&lb.security_group, ResourceKind::SecurityGroup),
            ],
            Resource::TargetGroup(tg) => vec![
                (&tg.network, ResourceKind::Network),
                (&tg.service, ResourceKind::Service),
                (&tg.task_definition, ResourceKind::TaskDefinition),
            ],
            Resource::Listener(l) => vec![
                (&l.load_balancer, ResourceKind::LoadBalancer),
                (&l.target_group, ResourceKind::TargetGroup),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OutputValue {
    /// `http://<load balancer DNS name>`
    LoadBalancerUrl { load_balancer: ResourceId },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSpec {
    pub id: ResourceId,
    pub description: Option<String>,
    pub value: OutputValue,
}

impl OutputSpec {
    pub fn references(&self) -> Vec<(&ResourceId, ResourceKind)> {
        match &self.value {
            OutputValue::LoadBalancerUrl { load_balancer } => {
                vec![(load_balancer, ResourceKind::LoadBalancer)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_rejects_punctuation() {
        assert!(ResourceId::new("MatomoALB").is_ok());
        assert!(ResourceId::new("matomo_alb").is_err());
    }

    #[test]
    fn test_security_group_references_include_peers() {
        let sg = Resource::SecurityGroup(SecurityGroupSpec {
            id: ResourceId::new("AppSG").unwrap(),
            description: "app".to_string(),
            network: ResourceId::new("Vpc").unwrap(),
            ingress: vec![IngressRule {
                peer: Peer::SecurityGroup(ResourceId::new("WebSG").unwrap()),
                protocol: Protocol::Tcp,
                port: 9000,
                description: "Allow PHP-FPM from NGINX".to_string(),
            }],
        });

        let refs: Vec<&str> = sg.references().iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(refs, vec!["Vpc", "WebSG"]);
        assert_eq!(sg.derived_ids(), vec!["AppSGFromWebSG9000".to_string()]);
    }

    #[test]
    fn test_network_derived_ids_cover_every_zone() {
        let net = Resource::Network(NetworkSpec {
            id: ResourceId::new("Vpc").unwrap(),
            max_azs: 2,
            cidr: "10.0.0.0/16".to_string(),
            subnet_cidrs: vec!["10.0.0.0/24".to_string(), "10.0.1.0/24".to_string()],
        });

        let ids = net.derived_ids();
        assert_eq!(ids.len(), 2 + 2 * 4);
        assert!(ids.contains(&"VpcIGW".to_string()));
        assert!(ids.contains(&"VpcPublicSubnet2RouteTableAssociation".to_string()));
    }
}
