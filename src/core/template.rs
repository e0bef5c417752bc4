//! CloudFormation-style template model and the mapping from graph resources
//! to template resources. Some graph resources expand into several template
//! resources (the network into VPC, gateway, subnets and routes; the task
//! definition into task definition plus execution role; peer ingress rules
//! into standalone ingress resources).

use crate::core::graph::ResourceGraph;
use crate::domain::model::{
    ClusterSpec, ContainerSpec, ListenerSpec, LoadBalancerSpec, LogGroupSpec, NetworkSpec,
    OutputSpec, OutputValue, Peer, Resource, ResourceId, SecurityGroupSpec, ServiceSpec,
    TargetGroupSpec, TaskSpec,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const FORMAT_VERSION: &str = "2010-09-09";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(rename = "Description", skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "Parameters", skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Parameter>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, TemplateResource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, TemplateOutput>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateResource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    pub properties: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<String>,
}

impl TemplateResource {
    fn new(resource_type: &str, properties: Value) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: Vec::new(),
            update_replace_policy: None,
            deletion_policy: None,
        }
    }

    fn depends_on(mut self, ids: Vec<String>) -> Self {
        self.depends_on = ids;
        self.depends_on.sort();
        self.depends_on.dedup();
        self
    }

    fn retained(mut self) -> Self {
        self.update_replace_policy = Some("Retain".to_string());
        self.deletion_policy = Some("Retain".to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: Value,
}

fn cfn_ref(id: impl AsRef<str>) -> Value {
    json!({ "Ref": id.as_ref() })
}

fn get_att(id: impl AsRef<str>, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [id.as_ref(), attribute] })
}

fn name_tag(stack: &str, id: &ResourceId) -> Value {
    json!([{ "Key": "Name", "Value": format!("{}/{}", stack, id) }])
}

impl Template {
    pub fn from_graph(graph: &ResourceGraph) -> Self {
        let mut template = Template {
            format_version: FORMAT_VERSION.to_string(),
            description: graph.description().to_string(),
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        };

        for resource in graph.resources() {
            match resource {
                Resource::Network(net) => template.add_network(graph, net),
                Resource::SecurityGroup(sg) => template.add_security_group(graph, sg),
                Resource::Cluster(cluster) => template.add_cluster(cluster),
                Resource::LogGroup(lg) => template.add_log_group(lg),
                Resource::TaskDefinition(task) => template.add_task_definition(graph, task),
                Resource::Service(svc) => template.add_service(graph, svc),
                Resource::LoadBalancer(lb) => template.add_load_balancer(graph, lb),
                Resource::Listener(listener) => template.add_listener(listener),
                Resource::TargetGroup(tg) => template.add_target_group(tg),
            }
        }

        for output in graph.outputs() {
            template.add_output(output);
        }

        template
    }

    fn insert(&mut self, id: impl Into<String>, resource: TemplateResource) {
        self.resources.insert(id.into(), resource);
    }

    fn network<'a>(graph: &'a ResourceGraph, id: &ResourceId) -> Option<&'a NetworkSpec> {
        match graph.get(id) {
            Some(Resource::Network(net)) => Some(net),
            _ => None,
        }
    }

    fn subnet_refs(graph: &ResourceGraph, network: &ResourceId) -> Value {
        let ids = Self::network(graph, network)
            .map(NetworkSpec::public_subnet_ids)
            .unwrap_or_default();
        Value::Array(ids.into_iter().map(cfn_ref).collect())
    }

    fn add_network(&mut self, graph: &ResourceGraph, net: &NetworkSpec) {
        let stack = graph.stack_name();
        let igw = net.gateway_id();
        let attachment = net.gateway_attachment_id();

        self.insert(
            net.id.as_str(),
            TemplateResource::new(
                "AWS::EC2::VPC",
                json!({
                    "CidrBlock": net.cidr,
                    "EnableDnsHostnames": true,
                    "EnableDnsSupport": true,
                    "InstanceTenancy": "default",
                    "Tags": name_tag(stack, &net.id),
                }),
            ),
        );
        self.insert(
            igw.clone(),
            TemplateResource::new(
                "AWS::EC2::InternetGateway",
                json!({ "Tags": name_tag(stack, &net.id) }),
            ),
        );
        self.insert(
            attachment.clone(),
            TemplateResource::new(
                "AWS::EC2::VPCGatewayAttachment",
                json!({ "VpcId": cfn_ref(&net.id), "InternetGatewayId": cfn_ref(&igw) }),
            ),
        );

        let subnet_ids = net.public_subnet_ids();
        let route_ids = net.public_default_route_ids();
        for (index, cidr) in net.subnet_cidrs.iter().enumerate() {
            let prefix = net.public_subnet_prefix(index);
            let subnet = &subnet_ids[index];
            let route_table = format!("{}RouteTable", prefix);

            self.insert(
                subnet.clone(),
                TemplateResource::new(
                    "AWS::EC2::Subnet",
                    json!({
                        "VpcId": cfn_ref(&net.id),
                        "CidrBlock": cidr,
                        "AvailabilityZone": { "Fn::Select": [index, { "Fn::GetAZs": "" }] },
                        "MapPublicIpOnLaunch": true,
                        "Tags": [
                            { "Key": "Name", "Value": format!("{}/{}", stack, prefix) },
                            { "Key": "aws-cdk:subnet-type", "Value": "Public" },
                        ],
                    }),
                ),
            );
            self.insert(
                route_table.clone(),
                TemplateResource::new(
                    "AWS::EC2::RouteTable",
                    json!({ "VpcId": cfn_ref(&net.id) }),
                ),
            );
            self.insert(
                format!("{}RouteTableAssociation", prefix),
                TemplateResource::new(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({ "RouteTableId": cfn_ref(&route_table), "SubnetId": cfn_ref(subnet) }),
                ),
            );
            self.insert(
                route_ids[index].clone(),
                TemplateResource::new(
                    "AWS::EC2::Route",
                    json!({
                        "RouteTableId": cfn_ref(&route_table),
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "GatewayId": cfn_ref(&igw),
                    }),
                )
                .depends_on(vec![attachment.clone()]),
            );
        }
    }

    fn add_security_group(&mut self, graph: &ResourceGraph, sg: &SecurityGroupSpec) {
        let mut cidr_rules = Vec::new();
        for rule in &sg.ingress {
            match (&rule.peer, sg.peer_rule_id(rule)) {
                // 群組對群組的規則獨立成資源，避免兩個群組互相循環依賴
                (Peer::SecurityGroup(peer), Some(rule_id)) => self.insert(
                    rule_id,
                    TemplateResource::new(
                        "AWS::EC2::SecurityGroupIngress",
                        json!({
                            "Description": rule.description,
                            "FromPort": rule.port,
                            "GroupId": get_att(&sg.id, "GroupId"),
                            "IpProtocol": rule.protocol.as_str(),
                            "SourceSecurityGroupId": get_att(peer, "GroupId"),
                            "ToPort": rule.port,
                        }),
                    ),
                ),
                _ => cidr_rules.push(json!({
                    "CidrIp": "0.0.0.0/0",
                    "Description": rule.description,
                    "FromPort": rule.port,
                    "IpProtocol": rule.protocol.as_str(),
                    "ToPort": rule.port,
                })),
            }
        }

        let mut properties = json!({
            "GroupDescription": sg.description,
            "SecurityGroupEgress": [{
                "CidrIp": "0.0.0.0/0",
                "Description": "Allow all outbound traffic by default",
                "IpProtocol": "-1",
            }],
            "VpcId": cfn_ref(&sg.network),
            "Tags": name_tag(graph.stack_name(), &sg.id),
        });
        if !cidr_rules.is_empty() {
            properties["SecurityGroupIngress"] = Value::Array(cidr_rules);
        }

        self.insert(
            sg.id.as_str(),
            TemplateResource::new("AWS::EC2::SecurityGroup", properties),
        );
    }

    fn add_cluster(&mut self, cluster: &ClusterSpec) {
        self.insert(
            cluster.id.as_str(),
            TemplateResource::new("AWS::ECS::Cluster", json!({})),
        );
    }

    fn add_log_group(&mut self, lg: &LogGroupSpec) {
        self.insert(
            lg.id.as_str(),
            TemplateResource::new(
                "AWS::Logs::LogGroup",
                json!({ "RetentionInDays": lg.retention_days }),
            )
            .retained(),
        );
    }

    fn container_definition(container: &ContainerSpec) -> Value {
        json!({
            "Essential": container.essential,
            "Image": cfn_ref(&container.image.parameter),
            "LogConfiguration": {
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": cfn_ref(&container.log.log_group),
                    "awslogs-region": cfn_ref("AWS::Region"),
                    "awslogs-stream-prefix": container.log.stream_prefix,
                },
            },
            "Memory": container.memory_mib,
            "Name": container.name.as_str(),
            "PortMappings": [{ "ContainerPort": container.port, "Protocol": "tcp" }],
        })
    }

    fn add_task_definition(&mut self, graph: &ResourceGraph, task: &TaskSpec) {
        let role_id = task.execution_role_id();
        self.insert(
            role_id.clone(),
            TemplateResource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument": {
                        "Statement": [{
                            "Action": "sts:AssumeRole",
                            "Effect": "Allow",
                            "Principal": { "Service": "ecs-tasks.amazonaws.com" },
                        }],
                        "Version": "2012-10-17",
                    },
                    "ManagedPolicyArns": [{
                        "Fn::Join": ["", [
                            "arn:",
                            cfn_ref("AWS::Partition"),
                            ":iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy",
                        ]],
                    }],
                }),
            ),
        );

        for container in &task.containers {
            self.parameters.insert(
                container.image.parameter.clone(),
                Parameter {
                    parameter_type: "String".to_string(),
                    description: format!(
                        "Image URI for container {} built from {}",
                        container.name, container.image.path
                    ),
                },
            );
        }

        let definitions: Vec<Value> = task.containers.iter().map(Self::container_definition).collect();
        self.insert(
            task.id.as_str(),
            TemplateResource::new(
                "AWS::ECS::TaskDefinition",
                json!({
                    "ContainerDefinitions": definitions,
                    "Cpu": task.cpu.to_string(),
                    "ExecutionRoleArn": get_att(&role_id, "Arn"),
                    "Family": format!("{}{}", graph.stack_name(), task.id),
                    "Memory": task.memory_mib.to_string(),
                    "NetworkMode": "awsvpc",
                    "RequiresCompatibilities": ["FARGATE"],
                }),
            ),
        );
    }

    fn add_service(&mut self, graph: &ResourceGraph, svc: &ServiceSpec) {
        let mut load_balancers = Vec::new();
        let mut listeners = Vec::new();
        for tg in graph.target_groups_for(&svc.id) {
            load_balancers.push(json!({
                "ContainerName": tg.container.as_str(),
                "ContainerPort": tg.port,
                "TargetGroupArn": cfn_ref(&tg.id),
            }));
            listeners.extend(graph.listeners_for(&tg.id).map(|l| l.id.to_string()));
        }

        let assign_public_ip = if svc.assign_public_ip { "ENABLED" } else { "DISABLED" };
        let mut properties = json!({
            "Cluster": cfn_ref(&svc.cluster),
            "DeploymentConfiguration": { "MaximumPercent": 200, "MinimumHealthyPercent": 50 },
            "DesiredCount": svc.desired_count,
            "EnableECSManagedTags": false,
            "LaunchType": "FARGATE",
            "NetworkConfiguration": {
                "AwsvpcConfiguration": {
                    "AssignPublicIp": assign_public_ip,
                    "SecurityGroups": [get_att(&svc.security_group, "GroupId")],
                    "Subnets": Self::subnet_refs(graph, &svc.network),
                },
            },
            "TaskDefinition": cfn_ref(&svc.task_definition),
        });
        if !load_balancers.is_empty() {
            properties["HealthCheckGracePeriodSeconds"] = json!(60);
            properties["LoadBalancers"] = Value::Array(load_balancers);
        }

        // service 必須在 listener 掛上 target group 之後才建立
        self.insert(
            svc.id.as_str(),
            TemplateResource::new("AWS::ECS::Service", properties).depends_on(listeners),
        );
    }

    fn add_load_balancer(&mut self, graph: &ResourceGraph, lb: &LoadBalancerSpec) {
        let routes = Self::network(graph, &lb.network)
            .map(NetworkSpec::public_default_route_ids)
            .unwrap_or_default();
        let scheme = if lb.internet_facing { "internet-facing" } else { "internal" };

        self.insert(
            lb.id.as_str(),
            TemplateResource::new(
                "AWS::ElasticLoadBalancingV2::LoadBalancer",
                json!({
                    "LoadBalancerAttributes": [{ "Key": "deletion_protection.enabled", "Value": "false" }],
                    "Scheme": scheme,
                    "SecurityGroups": [get_att(&lb.security_group, "GroupId")],
                    "Subnets": Self::subnet_refs(graph, &lb.network),
                    "Type": "application",
                }),
            )
            .depends_on(routes),
        );
    }

    fn add_listener(&mut self, listener: &ListenerSpec) {
        self.insert(
            listener.id.as_str(),
            TemplateResource::new(
                "AWS::ElasticLoadBalancingV2::Listener",
                json!({
                    "DefaultActions": [{
                        "TargetGroupArn": cfn_ref(&listener.target_group),
                        "Type": "forward",
                    }],
                    "LoadBalancerArn": cfn_ref(&listener.load_balancer),
                    "Port": listener.port,
                    "Protocol": "HTTP",
                }),
            ),
        );
    }

    fn add_target_group(&mut self, tg: &TargetGroupSpec) {
        self.insert(
            tg.id.as_str(),
            TemplateResource::new(
                "AWS::ElasticLoadBalancingV2::TargetGroup",
                json!({
                    "HealthCheckIntervalSeconds": tg.health_check.interval_secs,
                    "HealthCheckPath": tg.health_check.path,
                    "Port": tg.port,
                    "Protocol": "HTTP",
                    "TargetGroupAttributes": [{ "Key": "stickiness.enabled", "Value": "false" }],
                    "TargetType": "ip",
                    "VpcId": cfn_ref(&tg.network),
                }),
            ),
        );
    }

    fn add_output(&mut self, output: &OutputSpec) {
        let value = match &output.value {
            OutputValue::LoadBalancerUrl { load_balancer } => json!({
                "Fn::Join": ["", ["http://", get_att(load_balancer, "DNSName")]],
            }),
        };
        self.outputs.insert(
            output.id.to_string(),
            TemplateOutput {
                description: output.description.clone(),
                value,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackConfig;
    use crate::core::builder::build;

    fn template() -> Template {
        Template::from_graph(&build(&StackConfig::default()).unwrap())
    }

    #[test]
    fn test_network_expands_per_zone() {
        let template = template();
        assert_eq!(template.resources["MatomoVpc"].resource_type, "AWS::EC2::VPC");
        assert!(template.resources.contains_key("MatomoVpcPublicSubnet1Subnet"));
        assert!(template.resources.contains_key("MatomoVpcPublicSubnet2Subnet"));
        assert!(!template.resources.contains_key("MatomoVpcPublicSubnet3Subnet"));
        assert_eq!(
            template.resources["MatomoVpcPublicSubnet2Subnet"].properties["CidrBlock"],
            "10.0.1.0/24"
        );
    }

    #[test]
    fn test_peer_rules_are_standalone_ingress() {
        let template = template();
        let rule = &template.resources["AppSGFromWebSG9000"];
        assert_eq!(rule.resource_type, "AWS::EC2::SecurityGroupIngress");
        assert_eq!(
            rule.properties["SourceSecurityGroupId"],
            json!({ "Fn::GetAtt": ["WebSG", "GroupId"] })
        );
        assert!(template.resources["AppSG"].properties.get("SecurityGroupIngress").is_none());
        assert_eq!(
            template.resources["WebSG"].properties["SecurityGroupIngress"][0]["FromPort"],
            80
        );
    }

    #[test]
    fn test_service_waits_for_listener() {
        let template = template();
        let service = &template.resources["MatomoFargateService"];
        assert_eq!(service.depends_on, vec!["MatomoListener".to_string()]);
        assert_eq!(
            service.properties["LoadBalancers"][0]["ContainerName"],
            "MatomoNginx"
        );
        assert_eq!(
            service.properties["NetworkConfiguration"]["AwsvpcConfiguration"]["AssignPublicIp"],
            "ENABLED"
        );
    }

    #[test]
    fn test_task_definition_shape() {
        let template = template();
        let task = &template.resources["MatomoTaskDef"];
        assert_eq!(task.properties["Cpu"], "512");
        assert_eq!(task.properties["Memory"], "1024");
        assert_eq!(task.properties["ContainerDefinitions"].as_array().unwrap().len(), 2);
        assert!(template.resources.contains_key("MatomoTaskDefExecutionRole"));
        assert!(template.parameters.contains_key("MatomoNginxImageUri"));
        assert!(template.parameters.contains_key("MatomoPHPFPMImageUri"));
    }

    #[test]
    fn test_log_groups_are_retained_for_a_week() {
        let template = template();
        let lg = &template.resources["MatomoNginxLogGroup"];
        assert_eq!(lg.properties["RetentionInDays"], 7);
        assert_eq!(lg.deletion_policy.as_deref(), Some("Retain"));
    }

    #[test]
    fn test_output_joins_dns_name() {
        let template = template();
        assert_eq!(
            template.outputs["MatomoURL"].value,
            json!({ "Fn::Join": ["", ["http://", { "Fn::GetAtt": ["MatomoALB", "DNSName"] }]] })
        );
    }
}
