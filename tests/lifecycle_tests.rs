//! Loan request lifecycle tests: intake, state machine, concurrency

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::routing::post;
    use axum::{Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use sqlx::PgPool;
    use uuid::Uuid;

    use dentalink_server::financing::{
        can_transition, payment_terms, CreateLoanRequest, FinancingError, FinancingService,
        ListLoanRequestsQuery, LoanBounds, LoanRequestStatus,
    };
    use dentalink_server::gateway::{GatewayClient, GatewaySettings};
    use dentalink_server::models::{Actor, ActorRole};

    /// Helper to create a test database pool
    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/dentalink_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        dentalink_server::db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn test_bounds() -> LoanBounds {
        LoanBounds {
            min_amount: dec!(100),
            max_amount: dec!(50000),
            min_installments: 2,
            max_installments: 60,
            default_monthly_rate: dec!(0.025),
        }
    }

    /// Service wired to an unreachable gateway; lifecycle tests never touch
    /// the network.
    fn financing_service(pool: PgPool) -> Arc<FinancingService> {
        let gateway = Arc::new(GatewayClient::new(GatewaySettings {
            base_url: "http://127.0.0.1:9".to_string(),
            client_id: "test".to_string(),
            client_secret: "test".to_string(),
            timeout_seconds: 1,
            token_expiry_skew_seconds: 60,
        }));
        Arc::new(FinancingService::new(pool, test_bounds(), gateway))
    }

    /// Serve a canned financing provider on an ephemeral port. Submissions
    /// respond after `submit_delay`, which lets tests slip a concurrent
    /// transition in between the unlocked read and the conditional write.
    async fn spawn_provider_stub(submit_delay: Duration) -> String {
        let app = Router::new()
            .route(
                "/token",
                post(|| async { Json(json!({ "access_token": "tok", "expires_in": 3600 })) }),
            )
            .route(
                "/loan-requests",
                post(move || async move {
                    tokio::time::sleep(submit_delay).await;
                    Json(json!({
                        "id": format!("prov-{}", Uuid::new_v4()),
                        "status": "under_analysis",
                    }))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub provider");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    fn financing_service_with_gateway(pool: PgPool, base_url: String) -> Arc<FinancingService> {
        let gateway = Arc::new(GatewayClient::new(GatewaySettings {
            base_url,
            client_id: "test".to_string(),
            client_secret: "test".to_string(),
            timeout_seconds: 5,
            token_expiry_skew_seconds: 60,
        }));
        Arc::new(FinancingService::new(pool, test_bounds(), gateway))
    }

    async fn seed_clinic(pool: &PgPool) -> Uuid {
        let clinic_id = Uuid::new_v4();
        sqlx::query("INSERT INTO clinics (id, name, active) VALUES ($1, $2, TRUE)")
            .bind(clinic_id)
            .bind(format!("Test Clinic {}", clinic_id))
            .execute(pool)
            .await
            .expect("Failed to seed clinic");
        clinic_id
    }

    fn patient(id: Uuid) -> Actor {
        Actor {
            id,
            role: ActorRole::Patient,
        }
    }

    fn clinic(id: Uuid) -> Actor {
        Actor {
            id,
            role: ActorRole::Clinic,
        }
    }

    fn admin() -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role: ActorRole::Admin,
        }
    }

    async fn notification_count(pool: &PgPool, loan_request_id: Uuid, recipient: Uuid) -> i64 {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE loan_request_id = $1 AND recipient_id = $2",
        )
        .bind(loan_request_id)
        .bind(recipient)
        .fetch_one(pool)
        .await
        .expect("Failed to count notifications");
        count
    }

    // ===== Pure properties (no database) =====

    #[test]
    fn test_amortization_reference_figures() {
        let terms = payment_terms(dec!(5000), 12, dec!(0.025)).unwrap();
        assert_eq!(terms.monthly_payment, dec!(487.44));
        assert_eq!(terms.total_amount, dec!(5849.28));

        // Zero rate splits the principal exactly.
        let terms = payment_terms(dec!(1200), 12, dec!(0)).unwrap();
        assert_eq!(terms.monthly_payment, dec!(100.00));
    }

    #[test]
    fn test_transition_table_soundness() {
        // Every (role, from, to) triple not named by the table is denied.
        let legal: &[(ActorRole, LoanRequestStatus, LoanRequestStatus)] = &[
            (
                ActorRole::Clinic,
                LoanRequestStatus::Pending,
                LoanRequestStatus::ClinicApproved,
            ),
            (
                ActorRole::Clinic,
                LoanRequestStatus::Pending,
                LoanRequestStatus::ClinicRejected,
            ),
            (
                ActorRole::Admin,
                LoanRequestStatus::ClinicApproved,
                LoanRequestStatus::AdminProcessing,
            ),
            (
                ActorRole::Admin,
                LoanRequestStatus::ClinicApproved,
                LoanRequestStatus::Cancelled,
            ),
            (
                ActorRole::Admin,
                LoanRequestStatus::AdminProcessing,
                LoanRequestStatus::Approved,
            ),
            (
                ActorRole::Admin,
                LoanRequestStatus::AdminProcessing,
                LoanRequestStatus::Rejected,
            ),
            (
                ActorRole::Admin,
                LoanRequestStatus::Pending,
                LoanRequestStatus::Cancelled,
            ),
            (
                ActorRole::Gateway,
                LoanRequestStatus::AdminProcessing,
                LoanRequestStatus::Approved,
            ),
            (
                ActorRole::Gateway,
                LoanRequestStatus::AdminProcessing,
                LoanRequestStatus::Rejected,
            ),
            (
                ActorRole::Patient,
                LoanRequestStatus::Pending,
                LoanRequestStatus::Cancelled,
            ),
            (
                ActorRole::Patient,
                LoanRequestStatus::ClinicApproved,
                LoanRequestStatus::Cancelled,
            ),
        ];

        let roles = [
            ActorRole::Patient,
            ActorRole::Clinic,
            ActorRole::Admin,
            ActorRole::Gateway,
        ];

        for role in roles {
            for from in LoanRequestStatus::all() {
                for to in LoanRequestStatus::all() {
                    let expected = legal.contains(&(role, from, to));
                    assert_eq!(
                        can_transition(role, from, to),
                        expected,
                        "{:?}: {} -> {} should be {}",
                        role,
                        from,
                        to,
                        if expected { "allowed" } else { "denied" }
                    );
                }
            }
        }
    }

    // ===== Store-coupled properties =====

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_intake_persists_pending_with_computed_terms() {
        let pool = setup_test_db().await;
        let service = financing_service(pool.clone());
        let clinic_id = seed_clinic(&pool).await;
        let patient_id = Uuid::new_v4();

        let created = service
            .create_request(
                patient_id,
                CreateLoanRequest {
                    clinic_id,
                    amount: dec!(3000),
                    installments: 6,
                    purpose: "orthodontic treatment plan".to_string(),
                },
            )
            .await
            .expect("intake should succeed");

        assert_eq!(created.status, LoanRequestStatus::Pending);
        assert_eq!(created.monthly_rate, dec!(0.025));
        assert_eq!(
            created.monthly_payment * rust_decimal::Decimal::from(created.installments),
            created.total_amount
        );
        assert!(created.approved_at.is_none());
        assert!(created.rejected_at.is_none());
        assert!(created.gateway_request_id.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_intake_rejects_inactive_clinic_and_bad_bounds() {
        let pool = setup_test_db().await;
        let service = financing_service(pool.clone());
        let clinic_id = seed_clinic(&pool).await;

        sqlx::query("UPDATE clinics SET active = FALSE WHERE id = $1")
            .bind(clinic_id)
            .execute(&pool)
            .await
            .unwrap();

        let result = service
            .create_request(
                Uuid::new_v4(),
                CreateLoanRequest {
                    clinic_id,
                    amount: dec!(3000),
                    installments: 6,
                    purpose: "orthodontic treatment plan".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(FinancingError::ClinicNotFound(_))));

        let active_clinic = seed_clinic(&pool).await;
        let result = service
            .create_request(
                Uuid::new_v4(),
                CreateLoanRequest {
                    clinic_id: active_clinic,
                    amount: dec!(99999),
                    installments: 6,
                    purpose: "orthodontic treatment plan".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(FinancingError::Validation(_))));

        let result = service
            .create_request(
                Uuid::new_v4(),
                CreateLoanRequest {
                    clinic_id: active_clinic,
                    amount: dec!(3000),
                    installments: 1,
                    purpose: "orthodontic treatment plan".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(FinancingError::Validation(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_illegal_transition_leaves_status_unchanged() {
        let pool = setup_test_db().await;
        let service = financing_service(pool.clone());
        let clinic_id = seed_clinic(&pool).await;
        let patient_id = Uuid::new_v4();

        let created = service
            .create_request(
                patient_id,
                CreateLoanRequest {
                    clinic_id,
                    amount: dec!(2000),
                    installments: 4,
                    purpose: "dental implant financing".to_string(),
                },
            )
            .await
            .unwrap();

        // Admin cannot decide a request the clinic has not reviewed.
        let result = service
            .transition(created.id, admin(), LoanRequestStatus::Approved, None)
            .await;
        assert!(matches!(
            result,
            Err(FinancingError::InvalidTransition { .. })
        ));

        let reloaded = service.get_request(created.id).await.unwrap();
        assert_eq!(reloaded.status, LoanRequestStatus::Pending);
        assert!(reloaded.approved_at.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_terminal_states_are_immutable() {
        let pool = setup_test_db().await;
        let service = financing_service(pool.clone());
        let clinic_id = seed_clinic(&pool).await;
        let patient_id = Uuid::new_v4();

        let created = service
            .create_request(
                patient_id,
                CreateLoanRequest {
                    clinic_id,
                    amount: dec!(2000),
                    installments: 4,
                    purpose: "dental implant financing".to_string(),
                },
            )
            .await
            .unwrap();

        let rejected = service
            .transition(
                created.id,
                clinic(clinic_id),
                LoanRequestStatus::ClinicRejected,
                Some("insufficient history".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, LoanRequestStatus::ClinicRejected);
        let rejected_at = rejected.rejected_at.expect("rejected_at must be set");
        assert!(rejected.approved_at.is_none());

        // Cancellation after a terminal decision must fail, not silently
        // succeed.
        let result = service
            .transition(
                created.id,
                patient(patient_id),
                LoanRequestStatus::Cancelled,
                None,
            )
            .await;
        assert!(matches!(
            result,
            Err(FinancingError::InvalidTransition { .. })
        ));

        let reloaded = service.get_request(created.id).await.unwrap();
        assert_eq!(reloaded.status, LoanRequestStatus::ClinicRejected);
        assert_eq!(reloaded.rejected_at, Some(rejected_at));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_cancellation_stamps_rejected_timestamp() {
        let pool = setup_test_db().await;
        let service = financing_service(pool.clone());
        let clinic_id = seed_clinic(&pool).await;
        let patient_id = Uuid::new_v4();

        let created = service
            .create_request(
                patient_id,
                CreateLoanRequest {
                    clinic_id,
                    amount: dec!(2000),
                    installments: 4,
                    purpose: "dental implant financing".to_string(),
                },
            )
            .await
            .unwrap();

        let cancelled = service
            .transition(
                created.id,
                patient(patient_id),
                LoanRequestStatus::Cancelled,
                None,
            )
            .await
            .unwrap();

        // Cancelled is terminal, so exactly one decision timestamp is set.
        assert_eq!(cancelled.status, LoanRequestStatus::Cancelled);
        assert!(cancelled.rejected_at.is_some());
        assert!(cancelled.approved_at.is_none());
    }

    // ===== Gateway submission =====

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_submit_forwards_and_links_provider_id() {
        let pool = setup_test_db().await;
        let base_url = spawn_provider_stub(Duration::ZERO).await;
        let service = financing_service_with_gateway(pool.clone(), base_url);
        let clinic_id = seed_clinic(&pool).await;
        let patient_id = Uuid::new_v4();

        let created = service
            .create_request(
                patient_id,
                CreateLoanRequest {
                    clinic_id,
                    amount: dec!(4000),
                    installments: 8,
                    purpose: "full mouth rehabilitation".to_string(),
                },
            )
            .await
            .unwrap();

        service
            .transition(
                created.id,
                clinic(clinic_id),
                LoanRequestStatus::ClinicApproved,
                None,
            )
            .await
            .unwrap();

        let submitted = service
            .submit_to_gateway(created.id, admin(), Some("forwarded to provider".to_string()))
            .await
            .expect("submission should succeed");

        assert_eq!(submitted.status, LoanRequestStatus::AdminProcessing);
        assert!(submitted.gateway_request_id.is_some());
        assert_eq!(submitted.gateway_status.as_deref(), Some("under_analysis"));
        assert!(submitted.gateway_response.is_some());
        assert_eq!(
            submitted.admin_notes.as_deref(),
            Some("forwarded to provider")
        );
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_submit_requires_clinic_approval_first() {
        let pool = setup_test_db().await;
        let base_url = spawn_provider_stub(Duration::ZERO).await;
        let service = financing_service_with_gateway(pool.clone(), base_url);
        let clinic_id = seed_clinic(&pool).await;

        let created = service
            .create_request(
                Uuid::new_v4(),
                CreateLoanRequest {
                    clinic_id,
                    amount: dec!(4000),
                    installments: 8,
                    purpose: "full mouth rehabilitation".to_string(),
                },
            )
            .await
            .unwrap();

        let result = service.submit_to_gateway(created.id, admin(), None).await;
        assert!(matches!(
            result,
            Err(FinancingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_submit_conflicts_when_request_leaves_clinic_approved_mid_flight() {
        let pool = setup_test_db().await;
        // The provider answers slowly enough for a cancellation to land while
        // the submission round trip is in the air.
        let base_url = spawn_provider_stub(Duration::from_millis(400)).await;
        let service = financing_service_with_gateway(pool.clone(), base_url);
        let clinic_id = seed_clinic(&pool).await;
        let patient_id = Uuid::new_v4();

        let created = service
            .create_request(
                patient_id,
                CreateLoanRequest {
                    clinic_id,
                    amount: dec!(4000),
                    installments: 8,
                    purpose: "full mouth rehabilitation".to_string(),
                },
            )
            .await
            .unwrap();

        service
            .transition(
                created.id,
                clinic(clinic_id),
                LoanRequestStatus::ClinicApproved,
                None,
            )
            .await
            .unwrap();

        let (submit, cancel) = tokio::join!(
            service.submit_to_gateway(created.id, admin(), None),
            async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                service
                    .transition(
                        created.id,
                        patient(patient_id),
                        LoanRequestStatus::Cancelled,
                        None,
                    )
                    .await
            },
        );

        // The cancellation won the row; the stale submission must not
        // overwrite it.
        cancel.expect("cancellation should win");
        assert!(matches!(submit, Err(FinancingError::Conflict(_))));

        let reloaded = service.get_request(created.id).await.unwrap();
        assert_eq!(reloaded.status, LoanRequestStatus::Cancelled);
        assert!(reloaded.gateway_request_id.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_concurrent_transitions_have_one_winner() {
        let pool = setup_test_db().await;
        let service = financing_service(pool.clone());
        let clinic_id = seed_clinic(&pool).await;
        let patient_id = Uuid::new_v4();

        let created = service
            .create_request(
                patient_id,
                CreateLoanRequest {
                    clinic_id,
                    amount: dec!(1500),
                    installments: 3,
                    purpose: "root canal treatment".to_string(),
                },
            )
            .await
            .unwrap();

        // A clinic approval and a patient cancellation race on the same row.
        let (approve, cancel) = tokio::join!(
            service.transition(
                created.id,
                clinic(clinic_id),
                LoanRequestStatus::ClinicApproved,
                None,
            ),
            service.transition(
                created.id,
                patient(patient_id),
                LoanRequestStatus::Cancelled,
                None,
            ),
        );

        let winners = [approve.is_ok(), cancel.is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count();
        assert_eq!(winners, 1, "exactly one transition must win");

        let reloaded = service.get_request(created.id).await.unwrap();
        if approve.is_ok() {
            assert_eq!(reloaded.status, LoanRequestStatus::ClinicApproved);
            assert!(matches!(
                cancel,
                Err(FinancingError::InvalidTransition { .. })
            ));
        } else {
            assert_eq!(reloaded.status, LoanRequestStatus::Cancelled);
            assert!(matches!(
                approve,
                Err(FinancingError::InvalidTransition { .. })
            ));
        }
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_transition_enqueues_one_patient_notification() {
        let pool = setup_test_db().await;
        let service = financing_service(pool.clone());
        let clinic_id = seed_clinic(&pool).await;
        let patient_id = Uuid::new_v4();

        let created = service
            .create_request(
                patient_id,
                CreateLoanRequest {
                    clinic_id,
                    amount: dec!(1500),
                    installments: 3,
                    purpose: "root canal treatment".to_string(),
                },
            )
            .await
            .unwrap();

        service
            .transition(
                created.id,
                clinic(clinic_id),
                LoanRequestStatus::ClinicApproved,
                Some("approved in person".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(notification_count(&pool, created.id, patient_id).await, 1);

        let reloaded = service.get_request(created.id).await.unwrap();
        assert_eq!(
            reloaded.clinic_notes.as_deref(),
            Some("approved in person")
        );
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_list_requests_filters_by_patient_and_status() {
        let pool = setup_test_db().await;
        let service = financing_service(pool.clone());
        let clinic_id = seed_clinic(&pool).await;
        let patient_id = Uuid::new_v4();

        for _ in 0..3 {
            service
                .create_request(
                    patient_id,
                    CreateLoanRequest {
                        clinic_id,
                        amount: dec!(1000),
                        installments: 2,
                        purpose: "routine dental work".to_string(),
                    },
                )
                .await
                .unwrap();
        }

        let listed = service
            .list_requests(ListLoanRequestsQuery {
                patient_id: Some(patient_id),
                status: Some(LoanRequestStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(listed.len(), 3);
        assert!(listed.iter().all(|r| r.patient_id == patient_id));
    }
}
