//! Integration tests for the database lifecycle, sessions and request scopes.
//!
//! Each test runs against its own temporary SQLite file.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use coffee_tracker_api::database::{
    current_session, DatabaseManager, DbError, ManagerStatus, PoolConfig, RequestSessionScope,
    ScopeState,
};
use coffee_tracker_api::domain::user::{repository, UserError, UserService};

use common::{pool_config, ready_manager, temp_db};

// =============================================================================
// Manager lifecycle
// =============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_twice_keeps_existing_pool() {
        let db = temp_db();
        let config = pool_config(&db, 2, 0);
        let manager = ready_manager(&config).await;
        let before = manager.session_factory().unwrap();

        let result = manager.initialize(&config).await;
        assert!(matches!(result, Err(DbError::AlreadyInitialized)));

        assert_eq!(manager.status(), ManagerStatus::Ready);
        let after = manager.session_factory().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(manager.pool_status().unwrap().max_connections, 2);
    }

    #[test]
    fn test_unsupported_scheme_rejected() {
        let result = PoolConfig::new("mysql://root@localhost/app", false, 5, 10);
        assert!(matches!(result, Err(DbError::Config(_))));
    }

    #[tokio::test]
    async fn test_failed_initialize_can_be_retried() {
        let missing = temp_db();
        let url = format!(
            "sqlite://{}?mode=rwc",
            missing.dir.path().join("no-such-dir").join("app.db").display()
        );
        let bad = PoolConfig::new(url, false, 1, 0)
            .unwrap()
            .with_acquire_timeout(Duration::from_secs(2));

        let manager = DatabaseManager::new();
        assert_err!(manager.initialize(&bad).await);
        assert_eq!(manager.status(), ManagerStatus::Uninitialized);

        let db = temp_db();
        assert_ok!(manager.initialize(&pool_config(&db, 1, 0)).await);
        assert_eq!(manager.status(), ManagerStatus::Ready);
    }

    #[tokio::test]
    async fn test_lifecycle_calls_rejected_while_initializing() {
        // A server that accepts connections and never answers keeps the
        // manager in `Initializing`.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let config = PoolConfig::new(format!("postgres://app:secret@{addr}/app"), false, 1, 0)
            .unwrap()
            .with_acquire_timeout(Duration::from_secs(30));
        let manager = Arc::new(DatabaseManager::new());

        let init = {
            let manager = manager.clone();
            let config = config.clone();
            tokio::spawn(async move { manager.initialize(&config).await })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.status() != ManagerStatus::Initializing {
            assert!(Instant::now() < deadline, "initialize never started");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(matches!(
            manager.dispose().await,
            Err(DbError::InitializationInProgress)
        ));
        assert!(matches!(
            manager.initialize(&config).await,
            Err(DbError::InitializationInProgress)
        ));
        assert!(matches!(
            manager.session_factory(),
            Err(DbError::NotInitialized)
        ));
        assert_eq!(manager.status(), ManagerStatus::Initializing);

        // Abandoning the initialization resets the manager.
        init.abort();
        assert!(init.await.unwrap_err().is_cancelled());
        assert_eq!(manager.status(), ManagerStatus::Uninitialized);

        server.abort();
    }

    #[tokio::test]
    async fn test_sqlalchemy_style_scheme_accepted() {
        let db = temp_db();
        let url = db.url.replacen("sqlite://", "sqlite+aiosqlite://", 1);
        let config = PoolConfig::new(url, false, 1, 0).unwrap();
        let manager = ready_manager(&config).await;
        assert_eq!(manager.status(), ManagerStatus::Ready);
    }

    #[tokio::test]
    async fn test_dispose_then_new_session_fails() {
        let db = temp_db();
        let config = pool_config(&db, 1, 0);
        let manager = ready_manager(&config).await;

        assert_ok!(manager.dispose().await);
        assert_eq!(manager.status(), ManagerStatus::Disposed);
        assert!(manager.pool_status().is_none());

        assert!(matches!(manager.new_session().await, Err(DbError::Disposed)));
        assert!(matches!(manager.dispose().await, Err(DbError::Disposed)));
        assert!(matches!(
            manager.initialize(&config).await,
            Err(DbError::Disposed)
        ));
    }

    #[tokio::test]
    async fn test_factory_held_across_dispose_reports_disposed() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;
        let factory = manager.session_factory().unwrap();

        manager.dispose().await.unwrap();

        assert!(factory.is_closed());
        assert!(matches!(factory.new_session().await, Err(DbError::Disposed)));
    }

    #[tokio::test]
    async fn test_dispose_waits_for_drain_then_returns() {
        let db = temp_db();
        let config = pool_config(&db, 1, 0).with_drain_timeout(Duration::from_millis(200));
        let manager = ready_manager(&config).await;

        let held = manager.new_session().await.unwrap();

        let started = Instant::now();
        assert_ok!(manager.dispose().await);
        assert!(started.elapsed() >= Duration::from_millis(200));

        // The borrowed connection is still released cleanly afterwards.
        assert_ok!(held.close().await);
        let stats = manager.stats();
        assert_eq!(stats.sessions_opened, stats.sessions_closed);
    }
}

// =============================================================================
// Pool capacity
// =============================================================================

mod pool_tests {
    use super::*;

    #[tokio::test]
    async fn test_exhausted_pool_times_out() {
        let db = temp_db();
        let config = pool_config(&db, 1, 0).with_acquire_timeout(Duration::from_millis(200));
        let manager = ready_manager(&config).await;

        let held = manager.new_session().await.unwrap();
        let result = manager.new_session().await;
        assert!(matches!(result, Err(DbError::PoolExhausted)));
        assert_eq!(manager.stats().pool_timeouts, 1);

        held.close().await.unwrap();
        let next = assert_ok!(manager.new_session().await);
        next.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_waiter_unblocks_when_connection_returned() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;

        let held = manager.new_session().await.unwrap();

        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.new_session().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        held.close().await.unwrap();
        let session = assert_ok!(waiter.await.unwrap());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_waiters_served_in_arrival_order() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;

        let held = manager.new_session().await.unwrap();

        let first = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.new_session().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.new_session().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // One release unblocks exactly one waiter, the earliest.
        held.close().await.unwrap();
        let first_session = tokio::time::timeout(Duration::from_secs(5), first)
            .await
            .expect("first waiter served")
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!second.is_finished());

        first_session.close().await.unwrap();
        let second_session = tokio::time::timeout(Duration::from_secs(5), second)
            .await
            .expect("second waiter served")
            .unwrap()
            .unwrap();
        second_session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_overflow_allows_extra_borrows() {
        let db = temp_db();
        let config = pool_config(&db, 1, 2).with_acquire_timeout(Duration::from_millis(200));
        let manager = ready_manager(&config).await;

        let a = manager.new_session().await.unwrap();
        let b = manager.new_session().await.unwrap();
        let c = manager.new_session().await.unwrap();
        assert!(matches!(
            manager.new_session().await,
            Err(DbError::PoolExhausted)
        ));

        for session in [a, b, c] {
            session.close().await.unwrap();
        }
        let status = manager.pool_status().unwrap();
        assert_eq!(status.max_connections, 3);
    }
}

// =============================================================================
// Sessions
// =============================================================================

mod session_tests {
    use super::*;

    #[tokio::test]
    async fn test_close_twice_fails() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;

        let session = manager.new_session().await.unwrap();
        assert_ok!(session.close().await);
        assert!(session.is_closed());
        assert!(matches!(session.close().await, Err(DbError::SessionClosed)));

        let stats = manager.stats();
        assert_eq!(stats.sessions_opened, 1);
        assert_eq!(stats.sessions_closed, 1);
    }

    #[tokio::test]
    async fn test_failed_transaction_rolls_back() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;
        let session = manager.new_session().await.unwrap();

        let result = session
            .transaction::<(), UserError, _>(|conn| {
                Box::pin(async move {
                    repository::insert(conn, "rolled@back.io", 1).await?;
                    Err(UserError::InvalidEmail("abort".to_string()))
                })
            })
            .await;
        assert!(matches!(result, Err(UserError::InvalidEmail(_))));

        let users = session
            .transaction::<_, UserError, _>(|conn| {
                Box::pin(async move { Ok(repository::fetch_all(conn).await?) })
            })
            .await
            .unwrap();
        assert!(users.is_empty());

        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_transaction_discards_connection() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;
        let session = manager.new_session().await.unwrap();

        let (started_tx, started_rx) = oneshot::channel();
        let stalled = session.transaction::<(), UserError, _>(move |conn| {
            Box::pin(async move {
                repository::insert(conn, "half@done.io", 1).await?;
                let _ = started_tx.send(());
                std::future::pending::<()>().await;
                Ok(())
            })
        });

        // Drop the transaction future after its insert ran.
        tokio::select! {
            _ = stalled => panic!("stalled transaction completed"),
            _ = started_rx => {}
        }

        assert_ok!(session.close().await);
        let stats = manager.stats();
        assert_eq!(stats.sessions_discarded, 1);
        assert_eq!(stats.close_failures, 0);

        // A fresh connection replaces the discarded one; the insert never landed.
        let next = manager.new_session().await.unwrap();
        let users = next
            .transaction::<_, UserError, _>(|conn| {
                Box::pin(async move { Ok(repository::fetch_all(conn).await?) })
            })
            .await
            .unwrap();
        assert!(users.is_empty());
        next.close().await.unwrap();
        assert_eq!(manager.stats().sessions_discarded, 1);
    }

    #[tokio::test]
    async fn test_transaction_on_closed_session_fails() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;
        let session = manager.new_session().await.unwrap();
        session.close().await.unwrap();

        let result = session
            .transaction::<_, UserError, _>(|conn| {
                Box::pin(async move { Ok(repository::fetch_all(conn).await?) })
            })
            .await;
        assert!(matches!(
            result,
            Err(UserError::Database(DbError::SessionClosed))
        ));
    }
}

// =============================================================================
// Request scopes
// =============================================================================

mod scope_tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_binds_session_for_its_future_only() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 2, 0)).await;
        let factory = manager.session_factory().unwrap();

        let mut scope = RequestSessionScope::new(Uuid::new_v4());
        scope.begin(&factory).await.unwrap();
        assert_eq!(scope.state(), ScopeState::Active);

        let expected = scope.session().unwrap().clone();
        let seen = scope
            .run(async { current_session().unwrap() })
            .await
            .unwrap();
        assert!(seen.same_as(&expected));

        // Outside `run` nothing is bound.
        assert!(matches!(current_session(), Err(DbError::NoActiveSession)));

        scope.end().await.unwrap();
        assert_eq!(scope.state(), ScopeState::Ended);
        assert!(expected.is_closed());
    }

    #[tokio::test]
    async fn test_concurrent_scopes_see_their_own_session() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 4, 0)).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let factory = manager.session_factory().unwrap();
            handles.push(tokio::spawn(async move {
                let mut scope = RequestSessionScope::new(Uuid::new_v4());
                scope.begin(&factory).await.unwrap();
                let own_id = scope.session().unwrap().id();

                let seen = scope
                    .run(async {
                        let first = current_session().unwrap().id();
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        let second = current_session().unwrap().id();
                        (first, second)
                    })
                    .await
                    .unwrap();

                scope.end().await.unwrap();
                (own_id, seen)
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            let (own_id, (first, second)) = handle.await.unwrap();
            assert_eq!(own_id, first);
            assert_eq!(own_id, second);
            ids.push(own_id);
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 4);

        let stats = manager.stats();
        assert_eq!(stats.scopes_begun, 4);
        assert_eq!(stats.scopes_ended, 4);
        assert_eq!(stats.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_nested_scope_restores_outer_binding() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 2, 0)).await;
        let factory = manager.session_factory().unwrap();

        let mut outer = RequestSessionScope::new(Uuid::new_v4());
        outer.begin(&factory).await.unwrap();
        let outer_id = outer.session().unwrap().id();

        let (inner_seen, restored) = outer
            .run(async {
                let mut inner = RequestSessionScope::new(Uuid::new_v4());
                inner.begin(&factory).await.unwrap();
                let inner_seen = inner
                    .run(async { current_session().unwrap().id() })
                    .await
                    .unwrap();
                inner.end().await.unwrap();
                (inner_seen, current_session().unwrap().id())
            })
            .await
            .unwrap();

        assert_ne!(inner_seen, outer_id);
        assert_eq!(restored, outer_id);
        outer.end().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawned_task_has_no_session() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;
        let factory = manager.session_factory().unwrap();

        let mut scope = RequestSessionScope::new(Uuid::new_v4());
        scope.begin(&factory).await.unwrap();

        let spawned = scope
            .run(async {
                tokio::spawn(async { current_session().map(|s| s.id()) })
                    .await
                    .unwrap()
            })
            .await
            .unwrap();
        assert!(matches!(spawned, Err(DbError::NoActiveSession)));

        scope.end().await.unwrap();
    }

    #[tokio::test]
    async fn test_scope_transitions_are_one_shot() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;
        let factory = manager.session_factory().unwrap();

        let mut scope = RequestSessionScope::new(Uuid::new_v4());
        scope.begin(&factory).await.unwrap();
        assert!(matches!(
            scope.begin(&factory).await,
            Err(DbError::ScopeAlreadyBegun)
        ));

        assert_ok!(scope.end().await);
        assert!(matches!(scope.end().await, Err(DbError::ScopeNotActive)));
        assert!(matches!(
            scope.begin(&factory).await,
            Err(DbError::ScopeAlreadyBegun)
        ));
        assert!(matches!(
            scope.run(async {}).await,
            Err(DbError::ScopeNotActive)
        ));

        let stats = manager.stats();
        assert_eq!(stats.scopes_begun, 1);
        assert_eq!(stats.scopes_ended, 1);
        assert_eq!(stats.sessions_closed, 1);
    }

    #[tokio::test]
    async fn test_aborted_scope_releases_connection() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;
        let factory = manager.session_factory().unwrap();

        let task = tokio::spawn(async move {
            let mut scope = RequestSessionScope::new(Uuid::new_v4());
            scope.begin(&factory).await.unwrap();
            scope.run(std::future::pending::<()>()).await.unwrap();
        });

        // Wait until the scope holds the only connection.
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.stats().active_scopes() == 0 {
            assert!(Instant::now() < deadline, "scope never began");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let stats = manager.stats();
        assert_eq!(stats.scopes_begun, 1);
        assert_eq!(stats.scopes_ended, 1);
        assert_eq!(stats.scopes_dropped, 1);
        assert_eq!(stats.active_sessions(), 0);

        // Capacity recovers.
        let session = tokio::time::timeout(Duration::from_secs(5), manager.new_session())
            .await
            .expect("connection returned to pool")
            .unwrap();
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_aborted_transaction_in_scope_discards_connection() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;
        let factory = manager.session_factory().unwrap();

        let (started_tx, started_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut scope = RequestSessionScope::new(Uuid::new_v4());
            scope.begin(&factory).await.unwrap();
            scope
                .run(async move {
                    current_session()
                        .unwrap()
                        .transaction::<(), UserError, _>(move |conn| {
                            Box::pin(async move {
                                repository::insert(conn, "aborted@x.io", 1).await?;
                                let _ = started_tx.send(());
                                std::future::pending::<()>().await;
                                Ok(())
                            })
                        })
                        .await
                })
                .await
                .unwrap()
                .unwrap();
        });

        started_rx.await.unwrap();
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        let stats = manager.stats();
        assert_eq!(stats.scopes_dropped, 1);
        assert_eq!(stats.sessions_discarded, 1);
        assert_eq!(stats.active_sessions(), 0);

        let session = tokio::time::timeout(Duration::from_secs(5), manager.new_session())
            .await
            .expect("pool capacity recovered")
            .unwrap();
        let users = session
            .transaction::<_, UserError, _>(|conn| {
                Box::pin(async move { Ok(repository::fetch_all(conn).await?) })
            })
            .await
            .unwrap();
        assert!(users.is_empty());
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_end_with_failed_close_still_ends_scope() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;
        let factory = manager.session_factory().unwrap();

        let mut scope = RequestSessionScope::new(Uuid::new_v4());
        scope.begin(&factory).await.unwrap();

        // The handler closes the session itself, so the scope's close fails.
        scope
            .run(async {
                current_session().unwrap().close().await.unwrap();
                assert!(matches!(current_session(), Err(DbError::NoActiveSession)));
            })
            .await
            .unwrap();

        assert!(matches!(scope.end().await, Err(DbError::SessionClosed)));
        assert_eq!(scope.state(), ScopeState::Ended);
        assert!(scope.session().is_none());
        assert!(matches!(
            scope.run(async {}).await,
            Err(DbError::ScopeNotActive)
        ));
        assert!(matches!(scope.end().await, Err(DbError::ScopeNotActive)));

        let stats = manager.stats();
        assert_eq!(stats.scopes_ended, 1);
        assert_eq!(stats.sessions_opened, 1);
        assert_eq!(stats.sessions_closed, 1);

        let session = assert_ok!(manager.new_session().await);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_begin_fails_when_pool_exhausted() {
        let db = temp_db();
        let config = pool_config(&db, 1, 0).with_acquire_timeout(Duration::from_millis(100));
        let manager = ready_manager(&config).await;
        let factory = manager.session_factory().unwrap();

        let held = manager.new_session().await.unwrap();

        let mut scope = RequestSessionScope::new(Uuid::new_v4());
        assert!(matches!(
            scope.begin(&factory).await,
            Err(DbError::PoolExhausted)
        ));
        assert_eq!(scope.state(), ScopeState::NoScope);
        assert_eq!(manager.stats().scopes_begun, 0);

        held.close().await.unwrap();
    }
}

// =============================================================================
// User service inside a scope
// =============================================================================

mod service_tests {
    use super::*;

    #[tokio::test]
    async fn test_user_round_trip() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;
        let factory = manager.session_factory().unwrap();

        let mut scope = RequestSessionScope::new(Uuid::new_v4());
        scope.begin(&factory).await.unwrap();

        scope
            .run(async {
                let service = UserService::new();

                let created = service.create_user("X@Y.com").await.unwrap();
                assert_eq!(created.email, "x@y.com");
                assert!(created.id > 0);
                assert_eq!(created.created_at, created.updated_at);

                let fetched = service.get_user(created.id).await.unwrap();
                assert_eq!(fetched, created);

                let found = service.find_by_email("  x@Y.COM ").await.unwrap();
                assert_eq!(found, Some(created.clone()));
                assert_eq!(service.find_by_email("nobody@y.com").await.unwrap(), None);

                assert!(matches!(
                    service.get_user(created.id + 1000).await,
                    Err(UserError::NotFound(_))
                ));

                // Duplicate email is rejected and the session stays usable.
                assert!(matches!(
                    service.create_user("x@y.COM").await,
                    Err(UserError::EmailTaken(_))
                ));
                let users = service.list_users().await.unwrap();
                assert_eq!(users, vec![created]);
            })
            .await
            .unwrap();

        scope.end().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_users_ordered_by_id() {
        let db = temp_db();
        let manager = ready_manager(&pool_config(&db, 1, 0)).await;
        let factory = manager.session_factory().unwrap();

        let mut scope = RequestSessionScope::new(Uuid::new_v4());
        scope.begin(&factory).await.unwrap();

        let users = scope
            .run(async {
                let service = UserService::new();
                for email in ["c@x.io", "a@x.io", "b@x.io"] {
                    service.create_user(email).await.unwrap();
                }
                service.list_users().await.unwrap()
            })
            .await
            .unwrap();
        scope.end().await.unwrap();

        let emails: Vec<_> = users.iter().map(|u| u.email.as_str()).collect();
        assert_eq!(emails, vec!["c@x.io", "a@x.io", "b@x.io"]);
        assert!(users.windows(2).all(|w| w[0].id < w[1].id));
    }
}
