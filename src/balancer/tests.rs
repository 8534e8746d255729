#[cfg(test)]
mod tests {
    use crate::balancer::protocol::*;
    use crate::balancer::router;
    use crate::error::ClusterError;
    use crate::manager::protocol::{AddRequest, InitRequest, RemoveRequest};
    use crate::replica::protocol::KeyRange;
    use crate::testkit::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tower::ServiceExt;

    fn single_shard_init() -> InitRequest {
        InitRequest {
            n: Some(1),
            shards: vec![shard("A", 0, 100)],
            servers: layout(&[("s1", "A")]),
        }
    }

    fn range(low: i64, high: i64) -> KeyRange {
        KeyRange { low, high }
    }

    fn remove(n: usize, servers: &[&str]) -> RemoveRequest {
        RemoveRequest {
            n,
            servers: servers.iter().map(|s| s.to_string()).collect(),
        }
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ============================================================
    // INIT & STATUS
    // ============================================================

    #[tokio::test]
    async fn test_init_builds_rings_and_status() {
        let h = Harness::new();
        let response = h.balancer.init(two_shard_init()).await.unwrap();
        assert_eq!(response.message, "Configured Database");

        let status = h.balancer.status().await;
        assert_eq!(status.n, 2);
        assert_eq!(status.shards.len(), 2);
        assert_eq!(status.servers["s1"], vec!["sh1", "sh2"]);

        let picked = h.balancer.pick_replica("sh1").await.unwrap();
        assert!(picked == "s1" || picked == "s2");
    }

    #[tokio::test]
    async fn test_second_init_is_rejected() {
        let h = Harness::new();
        h.balancer.init(two_shard_init()).await.unwrap();

        let err = h.balancer.init(two_shard_init()).await.unwrap_err();
        assert_eq!(err.to_string(), "Database already configured");
    }

    #[tokio::test]
    async fn test_init_with_undefined_shard_is_rejected() {
        let h = Harness::new();
        let request = InitRequest {
            n: Some(1),
            shards: vec![shard("A", 0, 100)],
            servers: layout(&[("s1", "A B")]),
        };
        let err = h.balancer.init(request).await.unwrap_err();
        assert!(matches!(err, ClusterError::InvalidRequest(_)));
        assert!(!h.balancer.is_configured().await);
        assert!(h.cluster.node("s1").is_none());
    }

    // ============================================================
    // DATA PATH
    // ============================================================

    #[tokio::test]
    async fn test_write_then_read_single_shard() {
        let h = Harness::new();
        h.balancer.init(single_shard_init()).await.unwrap();

        let response = h.balancer.write(vec![student(5, 80)], None).await.unwrap();
        assert_eq!(response.message, "1 Data entries added");

        let result = h.balancer.read(range(0, 100)).await;
        assert_eq!(result.status, "success");
        assert_eq!(result.shards_queried, vec!["A"]);
        assert_eq!(result.data, vec![student(5, 80)]);
    }

    #[tokio::test]
    async fn test_read_sends_clipped_sub_ranges() {
        let h = Harness::new();
        h.balancer.init(two_shard_init()).await.unwrap();
        h.balancer
            .write(vec![student(10, 1), student(150, 2), student(99, 3)], None)
            .await
            .unwrap();

        let result = h.balancer.read(range(50, 160)).await;
        assert_eq!(result.status, "success");
        assert_eq!(result.shards_queried, vec!["sh1", "sh2"]);
        assert_eq!(result.data, vec![student(99, 3), student(150, 2)]);

        let result = h.balancer.read(range(300, 400)).await;
        assert!(result.shards_queried.is_empty());
        assert_eq!(result.status, "success");
    }

    #[tokio::test]
    async fn test_failed_shard_is_reported_not_fatal() {
        let h = Harness::new();
        let request = InitRequest {
            n: Some(2),
            shards: vec![shard("sh1", 0, 100), shard("sh2", 100, 100)],
            servers: layout(&[("s1", "sh1"), ("s2", "sh2")]),
        };
        h.balancer.init(request).await.unwrap();
        h.balancer.write(vec![student(1, 10)], None).await.unwrap();
        h.cluster.kill("s2");

        let result = h.balancer.read(range(0, 200)).await;
        assert_eq!(result.status, "sh2 failed");
        assert_eq!(result.shards_queried, vec!["sh1"]);
        assert_eq!(result.data, vec![student(1, 10)]);
    }

    #[tokio::test]
    async fn test_write_outside_every_shard_is_rejected() {
        let h = Harness::new();
        h.balancer.init(single_shard_init()).await.unwrap();

        let err = h
            .balancer
            .write(vec![student(5, 1), student(500, 1)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::InvalidRequest(_)));
        // Nothing was sent: validation happens before routing.
        assert!(h.balancer.read(range(0, 100)).await.data.is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let h = Harness::new();
        h.balancer.init(two_shard_init()).await.unwrap();
        h.balancer.write(vec![student(42, 10)], None).await.unwrap();

        let query = UpdateQuery {
            stud_id: 42,
            data: student(42, 99),
        };
        let response = h.balancer.update(query, None).await.unwrap();
        assert_eq!(response.message, "Data entry for Stud_id: 42 updated");
        assert_eq!(h.balancer.read(range(42, 43)).await.data, vec![student(42, 99)]);

        // Both replicas applied the update.
        for server in ["s1", "s2"] {
            let dump = h.cluster.node(server).unwrap().dump_all().await.unwrap();
            assert_eq!(dump["sh1"], vec![student(42, 99)]);
        }

        let response = h
            .balancer
            .delete(DeleteQuery { stud_id: 42 }, None)
            .await
            .unwrap();
        assert_eq!(
            response.message,
            "Data entry for Stud_id: 42 removed from all replicas"
        );
        assert!(h.balancer.read(range(0, 200)).await.data.is_empty());
    }

    #[tokio::test]
    async fn test_update_cannot_move_a_record() {
        let h = Harness::new();
        h.balancer.init(two_shard_init()).await.unwrap();

        let query = UpdateQuery {
            stud_id: 42,
            data: student(142, 99),
        };
        let err = h.balancer.update(query, None).await.unwrap_err();
        assert!(matches!(err, ClusterError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_repeated_request_count_is_applied_once() {
        let h = Harness::new();
        h.balancer.init(two_shard_init()).await.unwrap();

        h.balancer.write(vec![student(7, 1)], Some(2)).await.unwrap();
        // Same sequence again: acknowledged, not re-inserted.
        h.balancer.write(vec![student(7, 1)], Some(2)).await.unwrap();

        for server in ["s1", "s2"] {
            let node = h.cluster.node(server).unwrap();
            assert_eq!(node.log_length("sh1").await.unwrap(), 1);
            assert_eq!(node.dump_all().await.unwrap()["sh1"].len(), 1);
        }

        // The counter moved past the client's value.
        h.balancer.write(vec![student(8, 1)], None).await.unwrap();
        let node = h.cluster.node("s2").unwrap();
        assert_eq!(node.log_length("sh1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_write_succeeds_via_new_primary_after_failover() {
        let h = Harness::new();
        let request = InitRequest {
            n: Some(2),
            shards: vec![shard("A", 0, 100)],
            servers: layout(&[("s1", "A"), ("s2", "A")]),
        };
        h.balancer.init(request).await.unwrap();

        h.balancer.write(vec![student(1, 1)], None).await.unwrap();
        // s2 misses the next two writes: s1 ends at 3, s2 at 1.
        h.cluster.kill("s2");
        h.balancer
            .write(vec![student(2, 1), student(3, 1)], None)
            .await
            .unwrap();
        h.balancer.write(vec![student(4, 1)], None).await.unwrap();
        h.cluster.revive("s2");
        assert_eq!(h.cluster.node("s1").unwrap().log_length("A").await.unwrap(), 3);
        assert_eq!(h.cluster.node("s2").unwrap().log_length("A").await.unwrap(), 1);

        h.cluster.kill("s1");
        assert_eq!(h.manager.check_heartbeats().await, vec!["s1"]);
        assert_eq!(h.manager.primary_map().await.primary_of("A"), Some("s2"));

        h.balancer.write(vec![student(9, 1)], None).await.unwrap();
        let node = h.cluster.node("s2").unwrap();
        let ids: Vec<i64> = node.dump_all().await.unwrap()["A"]
            .iter()
            .map(|r| r.stud_id)
            .collect();
        assert_eq!(ids, vec![1, 9]);
        // The replacement s1 received the write as a secondary.
        let ids: Vec<i64> = h.cluster.node("s1").unwrap().dump_all().await.unwrap()["A"]
            .iter()
            .map(|r| r.stud_id)
            .collect();
        assert_eq!(ids, vec![1, 9]);
    }

    #[tokio::test]
    async fn test_write_during_repair_reaches_every_member() {
        let h = Harness::new();
        let request = InitRequest {
            n: Some(3),
            shards: vec![shard("A", 0, 100)],
            servers: layout(&[("s1", "A"), ("s2", "A"), ("s3", "A")]),
        };
        h.balancer.init(request).await.unwrap();
        h.balancer.write(vec![student(1, 1)], None).await.unwrap();

        // The replacement s1 takes a while to boot.
        h.cluster.kill("s1");
        h.cluster.slow_down("start", Duration::from_millis(300));
        let repair = tokio::spawn({
            let manager = h.manager.clone();
            async move { manager.check_heartbeats().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.manager.primary_map().await.primary_of("A"), Some("s2"));
        h.balancer.write(vec![student(7, 1)], None).await.unwrap();

        assert_eq!(repair.await.unwrap(), vec!["s1"]);
        for server in ["s1", "s2", "s3"] {
            let ids: Vec<i64> = h.cluster.node(server).unwrap().dump_all().await.unwrap()["A"]
                .iter()
                .map(|r| r.stud_id)
                .collect();
            assert_eq!(ids, vec![1, 7], "{} diverged", server);
        }
    }

    #[tokio::test]
    async fn test_write_without_primary_gives_up() {
        let h = Harness::new();
        h.balancer.init(single_shard_init()).await.unwrap();
        h.cluster.kill("s1");
        h.manager.elect("A").await;

        let err = h.balancer.write(vec![student(5, 1)], None).await.unwrap_err();
        assert!(matches!(err, ClusterError::Exhausted { .. }));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    // ============================================================
    // ADD / REMOVE
    // ============================================================

    #[tokio::test]
    async fn test_add_new_shard_on_new_server() {
        let h = Harness::new();
        h.balancer.init(single_shard_init()).await.unwrap();

        let request = AddRequest {
            n: Some(1),
            new_shards: vec![shard("B", 100, 100)],
            servers: layout(&[("s3", "B")]),
        };
        let response = h.balancer.add(request).await.unwrap();
        assert_eq!(response.n, 2);
        assert_eq!(response.message, "Add Server:s3");

        assert_eq!(h.balancer.pick_replica("B").await.unwrap(), "s3");
        h.balancer.write(vec![student(150, 1)], None).await.unwrap();
        assert_eq!(h.balancer.read(range(100, 200)).await.data, vec![student(150, 1)]);
    }

    #[tokio::test]
    async fn test_add_unknown_shard_is_rejected() {
        let h = Harness::new();
        h.balancer.init(single_shard_init()).await.unwrap();

        let request = AddRequest {
            n: Some(1),
            new_shards: Vec::new(),
            servers: layout(&[("s3", "B")]),
        };
        let err = h.balancer.add(request).await.unwrap_err();
        assert_eq!(err.to_string(), "<Error> Shard not found");
        assert!(h.cluster.node("s3").is_none());
    }

    #[tokio::test]
    async fn test_remove_validation() {
        let h = Harness::new();
        h.balancer.init(two_shard_init()).await.unwrap();

        let cases = [
            (remove(0, &[]), "<Error> Number of Servers to Remove cannot be zero"),
            (
                remove(1, &["s1", "s2"]),
                "<Error> Length of server list is more than removable instances",
            ),
            (remove(2, &[]), "<Error> Cannot remove all servers"),
        ];
        for (request, message) in cases {
            let err = h.balancer.remove(request).await.unwrap_err();
            assert_eq!(err.to_string(), message);
        }

        let err = h.balancer.remove(remove(1, &["s9"])).await.unwrap_err();
        assert!(matches!(err, ClusterError::UnknownServer(_)));
        assert_eq!(h.balancer.status().await.n, 2);
    }

    #[tokio::test]
    async fn test_remove_picks_random_server_when_unnamed() {
        let h = Harness::new();
        h.balancer.init(two_shard_init()).await.unwrap();

        let response = h.balancer.remove(remove(1, &[])).await.unwrap();
        assert_eq!(response.n, 1);
        assert_eq!(response.servers.len(), 1);
        let gone = &response.servers[0];
        assert!(h.cluster.node(gone).is_none());
        assert!(!h.balancer.status().await.servers.contains_key(gone));
    }

    #[tokio::test]
    async fn test_remove_hands_orphaned_shard_to_backup() {
        let h = Harness::new();
        let request = InitRequest {
            n: Some(2),
            shards: vec![shard("sh1", 0, 100), shard("sh2", 100, 100)],
            servers: layout(&[("s1", "sh1"), ("s2", "sh2")]),
        };
        h.balancer.init(request).await.unwrap();
        h.balancer.write(vec![student(150, 5)], None).await.unwrap();

        let response = h.balancer.remove(remove(1, &["s2"])).await.unwrap();
        assert_eq!(response.servers, vec!["s2"]);
        assert_eq!(response.n, 1);

        let status = h.balancer.status().await;
        assert_eq!(status.servers["s1"], vec!["sh1", "sh2"]);
        assert_eq!(h.balancer.pick_replica("sh2").await.unwrap(), "s1");
        assert_eq!(h.manager.primary_map().await.primary_of("sh2"), Some("s1"));

        let result = h.balancer.read(range(100, 200)).await;
        assert_eq!(result.data, vec![student(150, 5)]);
    }

    // ============================================================
    // HTTP SURFACE
    // ============================================================

    #[tokio::test]
    async fn test_http_init_write_read_status() {
        let h = Harness::new();
        let app = router(h.balancer.clone());

        let init = json!({
            "N": 1,
            "shards": [{"Stud_id_low": 0, "Shard_id": "sh1", "Shard_size": 100}],
            "servers": {"s1": ["sh1"]}
        });
        let response = app
            .clone()
            .oneshot(
                Request::post("/init")
                    .header("content-type", "application/json")
                    .body(Body::from(init.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "Configured Database");

        let write = json!({"data": [{"Stud_id": 3, "Stud_name": "ada", "Stud_marks": 90}]});
        let response = app
            .clone()
            .oneshot(
                Request::post("/write")
                    .header("content-type", "application/json")
                    .header("Request-Count", "1")
                    .body(Body::from(write.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["message"], "1 Data entries added");

        let read = json!({"Stud_id": {"low": 0, "high": 10}});
        let response = app
            .clone()
            .oneshot(
                Request::post("/read")
                    .header("content-type", "application/json")
                    .body(Body::from(read.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"][0]["Stud_name"], "ada");

        let response = app
            .clone()
            .oneshot(Request::get("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["N"], 1);
        assert_eq!(body["shards"][0]["Shard_id"], "sh1");

        let response = app
            .oneshot(Request::get("/read/s1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["sh1"][0]["Stud_id"], 3);
    }

    #[tokio::test]
    async fn test_http_errors() {
        let h = Harness::new();
        let app = router(h.balancer.clone());

        let response = app
            .clone()
            .oneshot(
                Request::post("/write")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"data\": ["))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Error decoding JSON");
        assert_eq!(body["status"], "failure");

        let response = app
            .clone()
            .oneshot(
                Request::post("/write")
                    .header("content-type", "application/json")
                    .header("Request-Count", "many")
                    .body(Body::from("{\"data\": []}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::delete("/rm")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"n\": 0, \"servers\": []}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "<Error> Number of Servers to Remove cannot be zero"
        );
    }
}
