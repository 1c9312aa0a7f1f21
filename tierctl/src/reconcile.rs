// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `create`: bring the topology into existence
//!
//! Resources are visited in a fixed order: network, subnet, router, then the
//! web, app and db servers, then the web server's floating IP.  Each one is
//! looked up by name and created only if it's absent, so running `create`
//! again changes nothing.  A failure stops the run where it is; whatever was
//! created before it stays.

use crate::config::Config;
use crate::config::FloatingIpPolicy;
use crate::config::ServerRole;
use crate::provider::require;
use crate::provider::CloudProvider;
use crate::report::Observation;
use crate::report::Reporter;
use slog::debug;
use slog::info;
use tierctl_common::api::external::Error;
use tierctl_common::api::external::FloatingIpCreate;
use tierctl_common::api::external::NetworkCreate;
use tierctl_common::api::external::ResourceRef;
use tierctl_common::api::external::ResourceType;
use tierctl_common::api::external::RouterCreate;
use tierctl_common::api::external::ServerCreate;
use tierctl_common::api::external::SubnetCreate;

/// Everything a server is created with, resolved by name before the first
/// server is created
struct ServerDependencies {
    image: ResourceRef,
    flavor: ResourceRef,
    keypair: ResourceRef,
    network: ResourceRef,
    security_group: ResourceRef,
}

pub async fn create(
    provider: &dyn CloudProvider,
    config: &Config,
    reporter: &mut Reporter,
) -> Result<(), Error> {
    let topology = &config.topology;

    let network = match provider
        .lookup(ResourceType::Network, &topology.network)
        .await?
    {
        Some(network) => {
            reporter.report(Observation::AlreadyExists {
                kind: ResourceType::Network,
            });
            network
        }
        None => {
            let params = NetworkCreate { name: topology.network.clone() };
            info!(reporter.log(), "creating network"; "name" => &params.name);
            let network = provider.network_create(&params).await?;
            reporter
                .report(Observation::Created { kind: ResourceType::Network });
            ResourceRef { id: network.id, name: network.name }
        }
    };

    let subnet_id = match provider
        .lookup(ResourceType::Subnet, &topology.subnet)
        .await?
    {
        Some(subnet) => {
            reporter.report(Observation::AlreadyExists {
                kind: ResourceType::Subnet,
            });
            subnet.id
        }
        None => {
            let params = SubnetCreate {
                name: topology.subnet.clone(),
                network_id: network.id.clone(),
                cidr: topology.cidr,
                ip_version: topology.ip_version,
            };
            info!(reporter.log(), "creating subnet";
                "name" => &params.name,
                "cidr" => %params.cidr,
            );
            let subnet = provider.subnet_create(&params).await?;
            reporter.report(Observation::Created { kind: ResourceType::Subnet });
            subnet.id
        }
    };

    let external_network = require(
        provider,
        ResourceType::Network,
        &topology.external_network,
    )
    .await?;
    match provider.lookup(ResourceType::Router, &topology.router).await? {
        Some(_) => {
            reporter.report(Observation::AlreadyExists {
                kind: ResourceType::Router,
            });
        }
        None => {
            let params = RouterCreate {
                name: topology.router.clone(),
                external_gateway_network_id: external_network.id.clone(),
                interface_subnet_id: Some(subnet_id),
            };
            info!(reporter.log(), "creating router"; "name" => &params.name);
            provider.router_create(&params).await?;
            reporter.report(Observation::Created { kind: ResourceType::Router });
        }
    }

    let dependencies = resolve_dependencies(provider, config).await?;

    let mut db_created = false;
    for (role, name) in topology.servers() {
        if provider.lookup(ResourceType::Server, name).await?.is_some() {
            reporter.report(Observation::ServerAlreadyExists {
                role,
                name: name.to_string(),
            });
            continue;
        }

        reporter.report(Observation::CreatingServer {
            role,
            name: name.to_string(),
        });
        let params = ServerCreate {
            name: name.to_string(),
            image_id: dependencies.image.id.clone(),
            flavor_id: dependencies.flavor.id.clone(),
            key_name: dependencies.keypair.name.clone(),
            network_ids: vec![dependencies.network.id.clone()],
            security_groups: vec![dependencies.security_group.name.clone()],
        };
        info!(reporter.log(), "creating server"; "name" => name, "role" => %role);
        provider.server_create(&params).await?;
        if role == ServerRole::Db {
            db_created = true;
        }
    }

    match config.create.floating_ip {
        FloatingIpPolicy::Ensure => {
            ensure_floating_ip(provider, config, &external_network, reporter)
                .await
        }
        FloatingIpPolicy::CreatedWithDb if db_created => {
            let web = require(
                provider,
                ResourceType::Server,
                &topology.servers.web,
            )
            .await?;
            associate_new_floating_ip(provider, &external_network, &web, reporter)
                .await
        }
        FloatingIpPolicy::CreatedWithDb => {
            debug!(reporter.log(), "db server already existed; \
                leaving floating IP alone");
            Ok(())
        }
    }
}

async fn resolve_dependencies(
    provider: &dyn CloudProvider,
    config: &Config,
) -> Result<ServerDependencies, Error> {
    let topology = &config.topology;
    Ok(ServerDependencies {
        image: require(provider, ResourceType::Image, &topology.image).await?,
        flavor: require(provider, ResourceType::Flavor, &topology.flavor)
            .await?,
        keypair: require(provider, ResourceType::Keypair, &topology.keypair)
            .await?,
        network: require(provider, ResourceType::Network, &topology.network)
            .await?,
        security_group: require(
            provider,
            ResourceType::SecurityGroup,
            &topology.security_group,
        )
        .await?,
    })
}

/// Give the web server a floating IP unless it already has one
async fn ensure_floating_ip(
    provider: &dyn CloudProvider,
    config: &Config,
    external_network: &ResourceRef,
    reporter: &mut Reporter,
) -> Result<(), Error> {
    let web_name = &config.topology.servers.web;
    let web = require(provider, ResourceType::Server, web_name).await?;
    let floating_ips = provider.server_floating_ips(&web.id).await?;
    if let Some(floating_ip) = floating_ips.first() {
        reporter.report(Observation::FloatingIpPresent {
            server: web.name.clone(),
            address: floating_ip.address,
        });
        return Ok(());
    }
    associate_new_floating_ip(provider, external_network, &web, reporter).await
}

async fn associate_new_floating_ip(
    provider: &dyn CloudProvider,
    external_network: &ResourceRef,
    server: &ResourceRef,
    reporter: &mut Reporter,
) -> Result<(), Error> {
    let params =
        FloatingIpCreate { floating_network_id: external_network.id.clone() };
    info!(reporter.log(), "allocating floating IP";
        "network" => &external_network.name,
        "server" => &server.name,
    );
    let floating_ip = provider.floating_ip_create(&params).await?;
    let floating_ip =
        provider.floating_ip_associate(&floating_ip, &server.id).await?;
    reporter.report(Observation::FloatingIpAssociated {
        server: server.name.clone(),
        address: floating_ip.address,
    });
    Ok(())
}

#[cfg(test)]
mod test {
    use super::create;
    use crate::config::Config;
    use crate::config::FloatingIpPolicy;
    use crate::report::Reporter;
    use crate::sim::SimCall;
    use crate::sim::SimCallKind;
    use crate::sim::SimCloud;
    use tierctl_common::api::external::Error;
    use tierctl_common::api::external::IpVersion;
    use tierctl_common::api::external::NetworkCreate;
    use tierctl_common::api::external::ResourceType;
    use tierctl_common::api::external::RouterCreate;
    use tierctl_common::api::external::ServerCreate;
    use tierctl_common::api::external::ServerStatus;
    use tierctl_common::api::external::SubnetCreate;
    use tierctl_test_utils::dev::test_setup_log;

    #[tokio::test]
    async fn test_create_fresh() {
        let logctx = test_setup_log("test_create_fresh");
        let config = Config::default();
        let sim = SimCloud::for_topology(&logctx.log, &config.topology);
        let mut reporter = Reporter::quiet(&logctx.log);

        create(&sim, &config, &mut reporter).await.unwrap();

        let lines = reporter.lines();
        assert_eq!(&lines[..6], &[
            "Network created",
            "Subnet created",
            "Router created",
            "Creating the Web server",
            "Creating the App server",
            "Creating the DB server",
        ]);
        assert_eq!(lines.len(), 7);
        assert!(
            lines[6].starts_with("Floating IP 203.0.113.")
                && lines[6].ends_with(" associated with tawaab1-web"),
            "{}",
            lines[6]
        );

        // Each resource is created exactly once, with its documented
        // configuration.
        let mutations = sim.mutations();
        assert_eq!(mutations.len(), 8);
        let network = sim.id_of(ResourceType::Network, "tawaab1-network").unwrap();
        let public = sim.id_of(ResourceType::Network, "public-net").unwrap();
        let subnet = sim.subnet("tawaab1-subnet").unwrap();
        assert_eq!(
            mutations[0],
            SimCall::NetworkCreate(NetworkCreate {
                name: String::from("tawaab1-network")
            })
        );
        assert_eq!(
            mutations[1],
            SimCall::SubnetCreate(SubnetCreate {
                name: String::from("tawaab1-subnet"),
                network_id: network.clone(),
                cidr: "192.168.50.0/24".parse().unwrap(),
                ip_version: IpVersion::V4,
            })
        );
        assert_eq!(
            mutations[2],
            SimCall::RouterCreate(RouterCreate {
                name: String::from("tawaab1-rtr"),
                external_gateway_network_id: public.clone(),
                interface_subnet_id: Some(subnet.id.clone()),
            })
        );
        for (mutation, name) in
            mutations[3..6].iter().zip(["tawaab1-web", "tawaab1-app", "tawaab1-db"])
        {
            let SimCall::ServerCreate(params) = mutation else {
                panic!("expected server create, found {:?}", mutation);
            };
            assert_eq!(
                *params,
                ServerCreate {
                    name: String::from(name),
                    image_id: sim.id_of(
                        ResourceType::Image,
                        "ubuntu-minimal-16.04-x86_64"
                    ).unwrap(),
                    flavor_id: sim.id_of(ResourceType::Flavor, "c1.c1r1").unwrap(),
                    key_name: String::from("tawaab1-key"),
                    network_ids: vec![network.clone()],
                    security_groups: vec![String::from("assignment2")],
                }
            );
        }
        assert_eq!(mutations[6].kind(), SimCallKind::FloatingIpCreate);
        assert_eq!(mutations[7].kind(), SimCallKind::FloatingIpAssociate);

        let web = sim.server("tawaab1-web").unwrap();
        assert_eq!(web.floating_ips.len(), 1);
        assert!(sim.server("tawaab1-app").unwrap().floating_ips.is_empty());
        let (router, interfaces) = sim.router("tawaab1-rtr").unwrap();
        assert_eq!(router.external_gateway_network_id, Some(public));
        assert_eq!(interfaces, vec![subnet.id]);

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_create_twice_is_idempotent() {
        let logctx = test_setup_log("test_create_twice_is_idempotent");
        let config = Config::default();
        let sim = SimCloud::for_topology(&logctx.log, &config.topology);

        create(&sim, &config, &mut Reporter::quiet(&logctx.log)).await.unwrap();
        let address = sim.server("tawaab1-web").unwrap().floating_ips[0];
        sim.clear_journal();

        let mut reporter = Reporter::quiet(&logctx.log);
        create(&sim, &config, &mut reporter).await.unwrap();
        assert_eq!(
            reporter.lines(),
            vec![
                String::from("Network already exists"),
                String::from("Subnet already exists"),
                String::from("Router already exists"),
                String::from("Web server already exists"),
                String::from("App server already exists"),
                String::from("DB server already exists"),
                format!("tawaab1-web already has floating IP {}", address),
            ]
        );
        assert!(sim.mutations().is_empty(), "{:?}", sim.mutations());
        assert_eq!(sim.floating_ips().len(), 1);

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_floating_ip_check_ignores_stale_server_view() {
        let logctx =
            test_setup_log("test_floating_ip_check_ignores_stale_server_view");
        let config = Config::default();
        let sim = SimCloud::builder()
            .external_network("public-net")
            .image("ubuntu-minimal-16.04-x86_64")
            .flavor("c1.c1r1")
            .keypair("tawaab1-key")
            .security_group("assignment2")
            .stale_server_addresses()
            .build(&logctx.log);

        create(&sim, &config, &mut Reporter::quiet(&logctx.log)).await.unwrap();
        let address = sim.floating_ips()[0].address;
        sim.clear_journal();

        // The server itself still shows no floating address, but the one
        // associated with its port is found and nothing is allocated.
        let mut reporter = Reporter::quiet(&logctx.log);
        create(&sim, &config, &mut reporter).await.unwrap();
        assert_eq!(
            reporter.lines().last().unwrap(),
            &format!("tawaab1-web already has floating IP {}", address)
        );
        assert!(sim.mutations().is_empty(), "{:?}", sim.mutations());
        assert_eq!(sim.floating_ips().len(), 1);

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_create_partial() {
        let logctx = test_setup_log("test_create_partial");
        let config = Config::default();
        let sim = SimCloud::builder()
            .external_network("public-net")
            .image("ubuntu-minimal-16.04-x86_64")
            .flavor("c1.c1r1")
            .keypair("tawaab1-key")
            .security_group("assignment2")
            .network("tawaab1-network")
            .server("tawaab1-app", ServerStatus::Shutoff)
            .build(&logctx.log);

        let mut reporter = Reporter::quiet(&logctx.log);
        create(&sim, &config, &mut reporter).await.unwrap();
        assert_eq!(&reporter.lines()[..6], &[
            "Network already exists",
            "Subnet created",
            "Router created",
            "Creating the Web server",
            "App server already exists",
            "Creating the DB server",
        ]);
        let server_creates: Vec<_> = sim
            .mutations()
            .into_iter()
            .filter(|c| c.kind() == SimCallKind::ServerCreate)
            .collect();
        assert_eq!(server_creates.len(), 2);

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_create_missing_dependency() {
        let logctx = test_setup_log("test_create_missing_dependency");
        let config = Config::default();
        let sim = SimCloud::builder()
            .external_network("public-net")
            .image("ubuntu-minimal-16.04-x86_64")
            .flavor("c1.c1r1")
            .security_group("assignment2")
            .build(&logctx.log);

        let mut reporter = Reporter::quiet(&logctx.log);
        let error = create(&sim, &config, &mut reporter).await.unwrap_err();
        assert_eq!(
            error,
            Error::not_found_by_name(ResourceType::Keypair, "tawaab1-key")
        );
        assert_eq!(error.to_string(), "keypair not found: name \"tawaab1-key\"");

        // Network, subnet and router were created and stay; no server was.
        assert!(sim.exists(ResourceType::Network, "tawaab1-network"));
        assert!(sim.exists(ResourceType::Router, "tawaab1-rtr"));
        assert!(sim
            .mutations()
            .iter()
            .all(|c| c.kind() != SimCallKind::ServerCreate));

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_create_missing_external_network() {
        let logctx = test_setup_log("test_create_missing_external_network");
        let config = Config::default();
        let sim = SimCloud::builder().build(&logctx.log);

        let error = create(&sim, &config, &mut Reporter::quiet(&logctx.log))
            .await
            .unwrap_err();
        assert_eq!(
            error,
            Error::not_found_by_name(ResourceType::Network, "public-net")
        );
        assert!(!sim.exists(ResourceType::Router, "tawaab1-rtr"));
        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_create_stops_at_first_fault() {
        let logctx = test_setup_log("test_create_stops_at_first_fault");
        let config = Config::default();
        let sim = SimCloud::for_topology(&logctx.log, &config.topology);
        sim.fail_next(
            SimCallKind::ServerCreate,
            Error::InsufficientCapacity { message: String::from("quota") },
        );

        let mut reporter = Reporter::quiet(&logctx.log);
        let error = create(&sim, &config, &mut reporter).await.unwrap_err();
        assert!(matches!(error, Error::InsufficientCapacity { .. }));
        assert_eq!(reporter.lines().last().unwrap(), "Creating the Web server");
        assert!(sim.server("tawaab1-web").is_none());
        assert!(sim.server("tawaab1-app").is_none());
        assert!(sim.exists(ResourceType::Subnet, "tawaab1-subnet"));

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_floating_ip_created_with_db_policy() {
        let logctx = test_setup_log("test_floating_ip_created_with_db_policy");
        let mut config = Config::default();
        config.create.floating_ip = FloatingIpPolicy::CreatedWithDb;

        // The db server already exists: no floating IP.
        let sim = SimCloud::builder()
            .external_network("public-net")
            .image("ubuntu-minimal-16.04-x86_64")
            .flavor("c1.c1r1")
            .keypair("tawaab1-key")
            .security_group("assignment2")
            .server("tawaab1-db", ServerStatus::Active)
            .build(&logctx.log);
        create(&sim, &config, &mut Reporter::quiet(&logctx.log)).await.unwrap();
        assert!(sim.floating_ips().is_empty());
        assert!(sim.server("tawaab1-web").unwrap().floating_ips.is_empty());

        // The db server had to be created: the web server gets one.  A second
        // run creates nothing, including no second floating IP.
        let sim = SimCloud::for_topology(&logctx.log, &config.topology);
        create(&sim, &config, &mut Reporter::quiet(&logctx.log)).await.unwrap();
        assert_eq!(sim.floating_ips().len(), 1);
        assert_eq!(sim.server("tawaab1-web").unwrap().floating_ips.len(), 1);
        sim.clear_journal();
        create(&sim, &config, &mut Reporter::quiet(&logctx.log)).await.unwrap();
        assert!(sim.mutations().is_empty());

        logctx.cleanup_successful();
    }

    #[tokio::test]
    async fn test_ensure_policy_repairs_missing_floating_ip() {
        let logctx =
            test_setup_log("test_ensure_policy_repairs_missing_floating_ip");
        let config = Config::default();
        let sim = SimCloud::builder()
            .external_network("public-net")
            .image("ubuntu-minimal-16.04-x86_64")
            .flavor("c1.c1r1")
            .keypair("tawaab1-key")
            .security_group("assignment2")
            .server("tawaab1-web", ServerStatus::Active)
            .server("tawaab1-app", ServerStatus::Active)
            .server("tawaab1-db", ServerStatus::Active)
            .build(&logctx.log);

        let mut reporter = Reporter::quiet(&logctx.log);
        create(&sim, &config, &mut reporter).await.unwrap();
        assert_eq!(sim.server("tawaab1-web").unwrap().floating_ips.len(), 1);
        assert!(reporter
            .lines()
            .last()
            .unwrap()
            .ends_with("associated with tawaab1-web"));

        logctx.cleanup_successful();
    }
}
