#![allow(clippy::unwrap_used, clippy::expect_used)]

#[cfg(test)]
mod adversarial_tests {
    use pare_policy::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use std::fs;

    fn snapshot(pairs: &[(&str, &str)]) -> EnvSnapshot {
        EnvSnapshot::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_git_server_allows_qualified_git() {
        let config = resolve(&snapshot(&[("PARE_GIT_ALLOWED_COMMANDS", "git")]), "git").unwrap();
        let validator = CommandValidator::new(&config.policy);
        assert!(validator.command("/usr/bin/git").is_ok());
    }

    #[test]
    fn test_build_strict_path_blocks_planted_binary() {
        let env = snapshot(&[
            ("PARE_BUILD_ALLOWED_COMMANDS", "npm,npx,tsc"),
            ("PARE_BUILD_STRICT_PATH", "true"),
        ]);
        let config = resolve(&env, "build").unwrap();
        let validator = CommandValidator::new(&config.policy);

        let err = validator.command("/tmp/evil/npm").unwrap_err();
        assert_eq!(err.kind(), "CommandNotAllowed");
        assert!(validator.command("npm").is_ok());
    }

    #[test]
    fn test_narrow_global_allowlist_disables_other_servers() {
        let env = snapshot(&[
            ("PARE_ALLOWED_COMMANDS", "git"),
            ("PARE_NPM_ALLOWED_COMMANDS", "npm"),
        ]);
        let npm = resolve(&env, "npm").unwrap();
        assert!(CommandValidator::new(&npm.policy).command("npm").is_err());
    }

    #[test]
    fn test_branch_name_injection() {
        let policy = PolicyConfig::unrestricted();
        let result = CommandValidator::new(&policy)
            .command("git")
            .unwrap()
            .arg("checkout")
            .user_arg("branch", "--orphan=pwned");
        assert!(matches!(result, Err(PolicyViolation::FlagInjectionRejected { .. })));
    }

    #[test]
    fn test_package_name_injection() {
        assert!(check_param("package", "--registry=http://evil").is_err());
        assert!(check_param("package", "left-pad").is_ok());
        assert!(check_param("filter", "@scope/pkg").is_ok());
    }

    #[test]
    fn test_home_prefix_sibling_is_outside() {
        let base = tempfile::tempdir().unwrap();
        let user = base.path().join("user");
        let user2 = base.path().join("user2");
        fs::create_dir(&user).unwrap();
        fs::create_dir(&user2).unwrap();

        let env = snapshot(&[("PARE_ALLOWED_ROOTS", user.to_str().unwrap())]);
        let config = resolve(&env, "git").unwrap();
        let guard = RootConfinement::new(&config.policy);

        assert!(guard.check_dir(&user).is_ok());
        assert!(matches!(
            guard.check_dir(&user2),
            Err(PolicyViolation::PathOutsideAllowedRoots(_))
        ));
    }

    #[test]
    fn test_explicit_list_is_exact() {
        let env = snapshot(&[
            ("PARE_TOOLS", "git:status,cargo:test"),
            ("PARE_PROFILE", "devops"),
            ("PARE_DOCKER_TOOLS", "ps"),
        ]);
        let resolver = ConfigResolver::new(&env).unwrap();
        let filter = resolver.tool_filter();

        let pairs = [
            ("git", "status", true),
            ("cargo", "test", true),
            ("docker", "ps", false),
            ("git", "log", false),
            ("k8s", "get", false),
        ];
        for (server, tool, expected) in pairs {
            assert_eq!(filter.is_enabled(server, tool), expected, "{server}:{tool}");
        }
    }

    proptest! {
        #[test]
        fn prop_basename_rule(
            dirs in prop::collection::vec("[a-z]{1,8}", 0..4),
            name in "[a-z][a-z0-9-]{0,10}",
            allowed in prop::collection::btree_set("[a-z][a-z0-9-]{0,10}", 0..5),
            strict in any::<bool>(),
        ) {
            let command = if dirs.is_empty() {
                name.clone()
            } else {
                format!("/{}/{}", dirs.join("/"), name)
            };
            let policy = PolicyConfig {
                allowed_commands: Allowlist::Only(allowed.clone()),
                strict_path: strict,
                ..PolicyConfig::unrestricted()
            };
            let accepted = CommandValidator::new(&policy).command(&command).is_ok();
            let expected = allowed.contains(&name) && !(strict && !dirs.is_empty());
            prop_assert_eq!(accepted, expected);
        }

        #[test]
        fn prop_unrestricted_accepts_any_name(name in "[A-Za-z0-9_.-]{1,16}") {
            prop_assume!(name != "." && name != "..");
            let policy = PolicyConfig::unrestricted();
            prop_assert!(CommandValidator::new(&policy).command(&name).is_ok());
        }

        #[test]
        fn prop_root_boundary(suffix in "[a-z0-9-]{1,6}", nested in any::<bool>()) {
            let base = tempfile::tempdir().unwrap();
            let root = base.path().join("user");
            fs::create_dir(&root).unwrap();
            let candidate = if nested {
                root.join(&suffix)
            } else {
                base.path().join(format!("user{suffix}"))
            };
            fs::create_dir_all(&candidate).unwrap();

            let policy = PolicyConfig {
                allowed_roots: Allowlist::Only(BTreeSet::from([CanonicalPath::new(&root).unwrap()])),
                ..PolicyConfig::unrestricted()
            };
            let accepted = RootConfinement::new(&policy).check_dir(&candidate).is_ok();
            prop_assert_eq!(accepted, nested);
        }

        #[test]
        fn prop_resolver_idempotent(
            tools in prop::option::of("[a-z]{1,5}:[a-z]{1,5}"),
            profile in prop::option::of(prop::sample::select(vec!["web", "RUST", "minimal"])),
            commands in prop::option::of("[a-z]{1,6}(,[a-z]{1,6}){0,3}"),
        ) {
            let mut pairs = vec![];
            if let Some(t) = &tools { pairs.push(("PARE_TOOLS", t.clone())); }
            if let Some(p) = profile { pairs.push(("PARE_PROFILE", p.to_string())); }
            if let Some(c) = &commands { pairs.push(("PARE_GIT_ALLOWED_COMMANDS", c.clone())); }
            let env = EnvSnapshot::from_pairs(pairs);

            let first = resolve(&env, "git").unwrap();
            let second = resolve(&env, "git").unwrap();
            prop_assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&second).unwrap()
            );
            prop_assert_eq!(first, second);
        }
    }
}
