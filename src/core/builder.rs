//! Builds the stack's resource graph from one `StackConfig`, bottom-up:
//! network, security groups, cluster, log groups, task definition, service,
//! load balancer, target group, listener, output.

use crate::config::{ContainerConfig, StackConfig};
use crate::core::graph::ResourceGraph;
use crate::domain::model::{
    ClusterSpec, ContainerSpec, HealthCheck, ImageAsset, IngressRule, ListenerSpec,
    LoadBalancerSpec, LogDestination, LogGroupSpec, NetworkSpec, OutputSpec, OutputValue, Peer,
    Protocol, Resource, ResourceId, SecurityGroupSpec, ServiceSpec, TargetGroupSpec, TaskSpec,
};
use crate::utils::error::{Result, StackError};
use crate::utils::validation::{validate_health_path, validate_one_of, validate_range};
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use tracing::{debug, info};

pub const MAX_AZS: u8 = 6;
pub const MIN_CONTAINER_MEMORY_MIB: u32 = 6;
pub const FARGATE_CPU_UNITS: [u32; 7] = [256, 512, 1024, 2048, 4096, 8192, 16384];
pub const LOG_RETENTION_DAYS: [u32; 22] = [
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];
pub const HEALTH_CHECK_INTERVAL_SECS: (u32, u32) = (5, 300);

/// Memory sizes (MiB) Fargate accepts for a given task cpu.
pub fn fargate_memory_options(cpu: u32) -> Vec<u32> {
    let stepped = |min: u32, max: u32, step: u32| -> Vec<u32> {
        (min..=max).step_by(step as usize).collect()
    };
    match cpu {
        256 => vec![512, 1024, 2048],
        512 => stepped(1024, 4096, 1024),
        1024 => stepped(2048, 8192, 1024),
        2048 => stepped(4096, 16384, 1024),
        4096 => stepped(8192, 30720, 1024),
        8192 => stepped(16384, 61440, 4096),
        16384 => stepped(32768, 122880, 8192),
        _ => Vec::new(),
    }
}

pub fn build(config: &StackConfig) -> Result<ResourceGraph> {
    info!("🏗️  Building resource graph for stack '{}'", config.stack.name);

    let mut graph = ResourceGraph::new(
        &config.stack.name,
        &config.stack.region,
        &config.stack.description,
    );

    let network_id = declare_network(&mut graph, config)?;
    let (proxy_sg, app_sg) = declare_security_groups(&mut graph, config, &network_id)?;

    let cluster_id = ResourceId::new(&config.cluster.id)?;
    graph.declare(Resource::Cluster(ClusterSpec {
        id: cluster_id,
        network: network_id.clone(),
    }))?;

    declare_task_definition(&mut graph, config)?;

    let service = &config.service;
    graph.declare(Resource::Service(ServiceSpec {
        id: ResourceId::new(&service.id)?,
        network: network_id.clone(),
        cluster: ResourceId::new(&service.cluster)?,
        task_definition: ResourceId::new(&service.task_definition)?,
        security_group: ResourceId::new(&service.security_group)?,
        desired_count: service.desired_count,
        assign_public_ip: service.assign_public_ip,
    }))?;

    declare_load_balancer(&mut graph, config, &network_id)?;

    graph.declare_output(OutputSpec {
        id: ResourceId::new(&config.output.id)?,
        description: config.output.description.clone(),
        value: OutputValue::LoadBalancerUrl {
            load_balancer: ResourceId::new(&config.load_balancer.id)?,
        },
    })?;

    debug!(
        "Security groups: proxy='{}', app='{}'",
        proxy_sg.as_str(),
        app_sg.as_str()
    );
    info!(
        "✅ Resource graph built: {} resources, {} outputs",
        graph.len(),
        graph.outputs().count()
    );
    Ok(graph)
}

fn declare_network(graph: &mut ResourceGraph, config: &StackConfig) -> Result<ResourceId> {
    let network = &config.network;
    validate_range("network.max_azs", network.max_azs, 1, MAX_AZS)?;

    let parsed: Ipv4Network = network.cidr.parse().map_err(|e| {
        StackError::config("network.cidr", format!("'{}' is not an IPv4 CIDR: {}", network.cidr, e))
    })?;
    // 10.0.5.0/16 -> 10.0.0.0/16
    let cidr = Ipv4Network::new(parsed.network(), parsed.prefix())
        .map_err(|e| StackError::config("network.cidr", e.to_string()))?;
    let subnet_cidrs = public_subnets(&cidr, network.max_azs)?;

    let id = ResourceId::new(&network.id)?;
    graph.declare(Resource::Network(NetworkSpec {
        id: id.clone(),
        max_azs: network.max_azs,
        cidr: cidr.to_string(),
        subnet_cidrs,
    }))?;
    Ok(id)
}

/// Carve one `/prefix+8` subnet per zone out of the network block.
fn public_subnets(cidr: &Ipv4Network, zones: u8) -> Result<Vec<String>> {
    validate_range("network.cidr prefix", cidr.prefix(), 16, 20)?;
    let subnet_prefix = cidr.prefix() + 8;

    let base = u32::from(cidr.network());
    let block_size = 1u32 << (32 - subnet_prefix);

    (0..u32::from(zones))
        .map(|i| {
            let addr = Ipv4Addr::from(base + i * block_size);
            Ipv4Network::new(addr, subnet_prefix)
                .map(|net| net.to_string())
                .map_err(|e| StackError::config("network.cidr", e.to_string()))
        })
        .collect()
}

fn declare_security_groups(
    graph: &mut ResourceGraph,
    config: &StackConfig,
    network_id: &ResourceId,
) -> Result<(ResourceId, ResourceId)> {
    let proxy = &config.containers.proxy;
    let app = &config.containers.app;
    let target = &config.load_balancer.target;
    validate_range("containers.proxy.port", proxy.port, 1, u16::MAX)?;
    validate_range("containers.app.port", app.port, 1, u16::MAX)?;

    let proxy_id = ResourceId::new(&config.security.proxy.id)?;
    graph.declare(Resource::SecurityGroup(SecurityGroupSpec {
        id: proxy_id.clone(),
        description: format!("{}/{}", config.stack.name, proxy_id),
        network: network_id.clone(),
        ingress: vec![IngressRule {
            peer: Peer::AnyIpv4,
            protocol: Protocol::Tcp,
            port: proxy.port,
            description: config.security.proxy.description.clone(),
        }],
    }))?;

    // app 群組只接受來自 proxy 群組的流量，不開放任何 IP 來源
    let mut ingress = vec![IngressRule {
        peer: Peer::SecurityGroup(proxy_id.clone()),
        protocol: Protocol::Tcp,
        port: app.port,
        description: config.security.app.description.clone(),
    }];
    if target.port != app.port {
        ingress.push(IngressRule {
            peer: Peer::SecurityGroup(proxy_id.clone()),
            protocol: Protocol::Tcp,
            port: target.port,
            description: "Load balancer to target".to_string(),
        });
    }

    let app_id = ResourceId::new(&config.security.app.id)?;
    graph.declare(Resource::SecurityGroup(SecurityGroupSpec {
        id: app_id.clone(),
        description: format!("{}/{}", config.stack.name, app_id),
        network: network_id.clone(),
        ingress,
    }))?;

    Ok((proxy_id, app_id))
}

fn declare_task_definition(graph: &mut ResourceGraph, config: &StackConfig) -> Result<()> {
    let task = &config.task;
    validate_one_of("task.cpu", task.cpu, &FARGATE_CPU_UNITS)?;
    validate_one_of(
        "task.memory_mib",
        task.memory_mib,
        fargate_memory_options(task.cpu).as_slice(),
    )?;

    let mut containers = Vec::with_capacity(2);
    for (field, container) in config.container_configs() {
        let spec = container_spec(graph, field, container, task.memory_mib)?;
        if let Some(existing) = containers.iter().find(|c: &&ContainerSpec| c.name == spec.name) {
            return Err(StackError::Conflict {
                id: existing.name.to_string(),
            });
        }
        if let Some(existing) = containers.iter().find(|c: &&ContainerSpec| c.port == spec.port) {
            return Err(StackError::range(
                &format!("{}.port", field),
                spec.port,
                format!("port already mapped by container '{}' in the same task", existing.name),
            ));
        }
        containers.push(spec);
    }

    let total: u32 = containers.iter().map(|c| c.memory_mib).sum();
    if total > task.memory_mib {
        return Err(StackError::range(
            "containers.*.memory_mib",
            total,
            format!("containers need more memory than the task ceiling of {} MiB", task.memory_mib),
        ));
    }

    if !containers.iter().any(|c| c.essential) {
        return Err(StackError::range(
            "containers.*.essential",
            false,
            "at least one container in the task must be essential",
        ));
    }

    graph.declare(Resource::TaskDefinition(TaskSpec {
        id: ResourceId::new(&task.id)?,
        cpu: task.cpu,
        memory_mib: task.memory_mib,
        containers,
    }))
}

/// Declares the container's log group and returns its descriptor.
fn container_spec(
    graph: &mut ResourceGraph,
    field: &str,
    container: &ContainerConfig,
    task_memory_mib: u32,
) -> Result<ContainerSpec> {
    validate_range(
        &format!("{}.memory_mib", field),
        container.memory_mib,
        MIN_CONTAINER_MEMORY_MIB,
        task_memory_mib,
    )?;
    validate_one_of(
        &format!("{}.log_retention_days", field),
        container.log_retention_days,
        &LOG_RETENTION_DAYS,
    )?;

    let log_group = ResourceId::new(&container.log_group_id)?;
    graph.declare(Resource::LogGroup(LogGroupSpec {
        id: log_group.clone(),
        retention_days: container.log_retention_days,
    }))?;

    let name = ResourceId::new(&container.name)?;
    Ok(ContainerSpec {
        image: ImageAsset {
            path: container.image.clone(),
            parameter: name.child("ImageUri"),
        },
        name,
        memory_mib: container.memory_mib,
        port: container.port,
        essential: container.essential,
        log: LogDestination {
            log_group,
            stream_prefix: container.log_stream_prefix.clone(),
        },
    })
}

fn declare_load_balancer(
    graph: &mut ResourceGraph,
    config: &StackConfig,
    network_id: &ResourceId,
) -> Result<()> {
    let lb = &config.load_balancer;
    let lb_id = ResourceId::new(&lb.id)?;
    graph.declare(Resource::LoadBalancer(LoadBalancerSpec {
        id: lb_id.clone(),
        network: network_id.clone(),
        security_group: ResourceId::new(&lb.security_group)?,
        internet_facing: lb.internet_facing,
    }))?;

    let target = &lb.target;
    let target_id = ResourceId::new(&target.id)?;
    let service_id = ResourceId::new(&target.service)?;
    let service = graph
        .service(&service_id)
        .ok_or_else(|| StackError::reference(target_id.as_str(), service_id.as_str()))?;
    let task_id = service.task_definition.clone();
    let task = graph
        .task_definition(&task_id)
        .ok_or_else(|| StackError::reference(service_id.as_str(), task_id.as_str()))?;

    let container_name = ResourceId::new(&target.container)?;
    let container = task.container(&container_name).ok_or_else(|| {
        StackError::reference(
            target_id.as_str(),
            &format!("{} (container of {})", container_name, task_id),
        )
    })?;
    if container.port != target.port {
        return Err(StackError::range(
            "load_balancer.target.port",
            target.port,
            format!("container '{}' exposes port {}", container.name, container.port),
        ));
    }

    let proxy_port = config.containers.proxy.port;
    if lb.listener.port != proxy_port {
        return Err(StackError::range(
            "load_balancer.listener.port",
            lb.listener.port,
            format!("the proxy container exposes port {}", proxy_port),
        ));
    }

    validate_health_path("load_balancer.target.health_check_path", &target.health_check_path)?;
    validate_range(
        "load_balancer.target.health_check_interval_secs",
        target.health_check_interval_secs,
        HEALTH_CHECK_INTERVAL_SECS.0,
        HEALTH_CHECK_INTERVAL_SECS.1,
    )?;

    graph.declare(Resource::TargetGroup(TargetGroupSpec {
        id: target_id.clone(),
        network: network_id.clone(),
        service: service_id,
        task_definition: task_id,
        container: container_name,
        port: target.port,
        health_check: HealthCheck {
            path: target.health_check_path.clone(),
            interval_secs: target.health_check_interval_secs,
        },
    }))?;

    graph.declare(Resource::Listener(ListenerSpec {
        id: ResourceId::new(&lb.listener.id)?,
        load_balancer: lb_id,
        port: lb.listener.port,
        target_group: target_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::ResourceKind;

    #[test]
    fn test_default_config_builds() {
        let graph = build(&StackConfig::default()).unwrap();

        assert_eq!(graph.count(ResourceKind::Network), 1);
        assert_eq!(graph.count(ResourceKind::SecurityGroup), 2);
        assert_eq!(graph.count(ResourceKind::LogGroup), 2);
        assert_eq!(graph.count(ResourceKind::TargetGroup), 1);
        assert!(graph.output("MatomoURL").is_some());
    }

    #[test]
    fn test_public_subnets_split_network() {
        let cidr: Ipv4Network = "10.0.0.0/16".parse().unwrap();
        let subnets = public_subnets(&cidr, 3).unwrap();
        assert_eq!(subnets, vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24"]);

        let small: Ipv4Network = "10.0.0.0/24".parse().unwrap();
        assert!(matches!(
            public_subnets(&small, 2),
            Err(StackError::Range { .. })
        ));
    }

    #[test]
    fn test_network_cidr_host_bits_are_cleared() {
        let mut config = StackConfig::default();
        config.network.cidr = "10.0.5.0/16".to_string();
        let graph = build(&config).unwrap();

        let Some(Resource::Network(net)) = graph.get(&ResourceId::new("MatomoVpc").unwrap()) else {
            panic!("MatomoVpc is not a network");
        };
        assert_eq!(net.cidr, "10.0.0.0/16");
        assert_eq!(net.subnet_cidrs[0], "10.0.0.0/24");
    }

    #[test]
    fn test_fargate_memory_table() {
        assert_eq!(fargate_memory_options(256), vec![512, 1024, 2048]);
        assert_eq!(fargate_memory_options(512), vec![1024, 2048, 3072, 4096]);
        assert!(fargate_memory_options(8192).contains(&20480));
        assert!(fargate_memory_options(300).is_empty());
    }

    #[test]
    fn test_zone_count_out_of_range() {
        let mut config = StackConfig::default();
        config.network.max_azs = 0;
        assert!(matches!(build(&config), Err(StackError::Range { .. })));

        config.network.max_azs = 7;
        assert!(matches!(build(&config), Err(StackError::Range { .. })));
    }

    #[test]
    fn test_invalid_task_size() {
        let mut config = StackConfig::default();
        config.task.memory_mib = 512;
        assert!(matches!(build(&config), Err(StackError::Range { .. })));
    }

    #[test]
    fn test_log_retention_must_be_supported() {
        let mut config = StackConfig::default();
        config.containers.app.log_retention_days = 8;
        assert!(matches!(build(&config), Err(StackError::Range { .. })));
    }

    #[test]
    fn test_no_essential_container() {
        let mut config = StackConfig::default();
        config.containers.proxy.essential = false;
        config.containers.app.essential = false;
        assert!(matches!(build(&config), Err(StackError::Range { .. })));
    }

    #[test]
    fn test_implied_rule_for_target_port() {
        let graph = build(&StackConfig::default()).unwrap();
        let app_sg = graph.get(&ResourceId::new("AppSG").unwrap()).unwrap();
        let Resource::SecurityGroup(sg) = app_sg else {
            panic!("AppSG is not a security group");
        };

        let ports: Vec<u16> = sg.ingress.iter().map(|r| r.port).collect();
        assert_eq!(ports, vec![9000, 80]);
    }

    #[test]
    fn test_duplicate_container_port() {
        let mut config = StackConfig::default();
        config.containers.app.port = 80;
        assert!(matches!(build(&config), Err(StackError::Range { .. })));
    }

    #[test]
    fn test_health_interval_bounds() {
        let mut config = StackConfig::default();
        config.load_balancer.target.health_check_interval_secs = 301;
        assert!(matches!(build(&config), Err(StackError::Range { .. })));
    }
}
