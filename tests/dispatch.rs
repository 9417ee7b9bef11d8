//! Dispatcher behaviour, driven through `DispatchService::handle`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::body::Body;
use serde_json::json;

use mne::dispatch::{guard, keys};
use mne::http::{PostData, QueryParams};
use mne::interceptors::{connect, CheckHttpMethod};
use mne::routing::Matches;
use mne::{action_fn, interceptor_fn, Interceptor, ResponseWriter, Scope, SimpleAction};

mod common;
use common::{body_text, post, request, service};

type Log = Arc<Mutex<Vec<String>>>;

fn tracer(log: &Log, name: &'static str) -> impl Interceptor {
    let log = log.clone();
    interceptor_fn(move |_, proceed| {
        log.lock().unwrap().push(format!("before {}", name));
        let log = log.clone();
        proceed.proceed_then(move |_, proceed| {
            log.lock().unwrap().push(format!("after {}", name));
            proceed.proceed()
        })
    })
}

fn echo_post_data() -> impl mne::Action {
    action_fn(|ctx| {
        let post_data = ctx.get_as::<PostData>(keys::POST_DATA)?;
        let response = ctx.get_as::<ResponseWriter>(keys::RESPONSE)?;
        let reply = move |result: Arc<Result<serde_json::Value, mne::HttpError>>| {
            match result.as_ref() {
                Ok(value) => {
                    response.set_header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    response.end_with(value.to_string());
                    Ok(())
                }
                Err(e) => Err(mne::HttpError::new(e.status(), e.message())),
            }
        };
        post_data.add_callback(guard::wrap(ctx, reply));
        Ok(())
    })
}

#[tokio::test]
async fn test_interceptors_wrap_the_action() {
    let log: Log = Arc::default();
    let action_log = log.clone();
    let service = service(|d| {
        d.add_interceptor(tracer(&log, "a")).add_interceptor(tracer(&log, "b"));
        d.add_action(
            "/",
            action_fn(move |ctx| {
                action_log.lock().unwrap().push("action".to_string());
                ctx.get_as::<ResponseWriter>(keys::RESPONSE)?
                    .html(StatusCode::OK, "ok");
                Ok(())
            }),
        )
        .unwrap();
    });

    let response = service.handle(request(Method::GET, "/"), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
    assert_eq!(
        *log.lock().unwrap(),
        vec!["before a", "before b", "action", "after b", "after a"]
    );
}

#[tokio::test]
async fn test_interceptor_short_circuits() {
    let reached = Arc::new(AtomicUsize::new(0));
    let counter = reached.clone();
    let service = service(|d| {
        d.add_interceptor(connect(|_, response, _| {
            response.html(StatusCode::FORBIDDEN, "go away");
            Ok(())
        }));
        d.add_action(
            "/",
            action_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .unwrap();
    });

    let response = service.handle(request(Method::GET, "/"), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "go away");
    assert_eq!(reached.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_chain_resumes_from_another_task() {
    let log: Log = Arc::default();
    let service = service(|d| {
        d.add_interceptor(tracer(&log, "outer"));
        d.add_interceptor(interceptor_fn(|ctx, proceed| {
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                guard::exec(&ctx, || proceed.proceed());
            });
            Ok(())
        }));
        d.add_action("/slow/", SimpleAction::new(StatusCode::OK, "late"))
            .unwrap();
    });

    let response = service.handle(request(Method::GET, "/slow/"), None).await;
    assert_eq!(body_text(response).await, "late");
    assert_eq!(*log.lock().unwrap(), vec!["before outer", "after outer"]);
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let service = service(|d| {
        d.add_action("/known/", SimpleAction::new(StatusCode::OK, "")).unwrap();
    });

    let response = service.handle(request(Method::GET, "/unknown/"), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html; charset=utf-8");
    assert_eq!(body_text(response).await, "<h1>404 Not Found</h1>");
}

#[tokio::test]
async fn test_standard_headers_on_every_response() {
    let service = service(|d| {
        d.add_action("/", SimpleAction::new(StatusCode::OK, "hi")).unwrap();
    });

    for uri in ["/", "/missing/"] {
        let response = service.handle(request(Method::GET, uri), None).await;
        let headers = response.headers();
        assert!(headers.contains_key(header::DATE), "{}", uri);
        assert_eq!(headers[header::SERVER], "mne");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }
}

#[tokio::test]
async fn test_panicking_action_is_500() {
    let service = service(|d| {
        d.add_action("/", action_fn(|_| panic!("boom"))).unwrap();
    });

    let response = service.handle(request(Method::GET, "/"), None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_text(response).await;
    assert!(body.starts_with("<h1>Server Error 500</h1>"), "{}", body);
    assert!(body.contains("panicked: boom"));
}

#[tokio::test]
async fn test_request_without_response_is_500() {
    let service = service(|d| {
        // Neither ends the response nor proceeds.
        d.add_interceptor(interceptor_fn(|_, _| Ok(())));
        d.add_action("/", SimpleAction::new(StatusCode::OK, "")).unwrap();
    });

    let response = service.handle(request(Method::GET, "/"), None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_matches_and_path_are_seeded() {
    let service = service(|d| {
        d.add_action(
            "/users/:id/files/*",
            action_fn(|ctx| {
                let matches = ctx.get_as::<Matches>(keys::MATCHES)?;
                let path = ctx.get_as::<String>(keys::PATH)?;
                let rest = matches.wildcard().unwrap_or_default().join("|");
                ctx.get_as::<ResponseWriter>(keys::RESPONSE)?.html(
                    StatusCode::OK,
                    format!("{};{};{}", matches.get("id").unwrap_or("-"), rest, path),
                );
                Ok(())
            }),
        )
        .unwrap();
    });

    let response = service
        .handle(request(Method::GET, "/users/jane%20doe/files/a/b.txt"), None)
        .await;
    assert_eq!(
        body_text(response).await,
        "jane doe;a|b.txt;/users/jane doe/files/a/b.txt"
    );
}

#[tokio::test]
async fn test_request_id_is_seeded() {
    let service = service(|d| {
        d.add_action(
            "/",
            action_fn(|ctx| {
                let id = ctx.get_as::<String>(keys::REQUEST_ID)?;
                ctx.get_as::<ResponseWriter>(keys::RESPONSE)?
                    .html(StatusCode::OK, id.as_bytes());
                Ok(())
            }),
        )
        .unwrap();
    });

    let with_id = Request::builder()
        .uri("/")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = service.handle(with_id, None).await;
    assert_eq!(body_text(response).await, "abc-123");

    let response = service.handle(request(Method::GET, "/"), None).await;
    let generated = body_text(response).await;
    assert!(uuid::Uuid::parse_str(&generated).is_ok(), "{}", generated);
}

#[tokio::test]
async fn test_method_check_answers_405() {
    let service = service(|d| {
        d.add_interceptor(CheckHttpMethod);
        d.add_action_for(
            "/items/",
            [Method::GET, Method::HEAD],
            SimpleAction::new(StatusCode::OK, "items"),
        )
        .unwrap();
        d.add_action("/any/", SimpleAction::new(StatusCode::OK, "any"))
            .unwrap();
    });

    let response = service.handle(request(Method::GET, "/items/"), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = service.handle(request(Method::DELETE, "/any/"), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = service.handle(request(Method::POST, "/items/"), None).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "GET,HEAD");
    assert_eq!(
        body_text(response).await,
        "Invalid method: POST; allowed: GET,HEAD"
    );
}

#[tokio::test]
async fn test_post_data_form_and_json() {
    let service = service(|d| {
        d.add_action("/echo/", echo_post_data()).unwrap();
    });

    let response = service
        .handle(
            post("/echo/", "application/x-www-form-urlencoded", "a=1&b=2&b=3"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let value: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(value, json!({"a": "1", "b": ["2", "3"]}));

    let response = service
        .handle(
            post("/echo/", "application/json; charset=utf-8", r#"{"x":[1,2]}"#),
            None,
        )
        .await;
    let value: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(value, json!({"x": [1, 2]}));
}

#[tokio::test]
async fn test_post_data_rejects_bad_bodies() {
    let service = service(|d| {
        d.add_action("/echo/", echo_post_data()).unwrap();
    });

    let response = service
        .handle(post("/echo/", "text/csv", "a,b"), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_text(response).await,
        "<h1>Unsupported content type: text/csv</h1>"
    );

    let response = service
        .handle(post("/echo/", "application/json", "{oops"), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("Invalid JSON data"));
}

#[tokio::test]
async fn test_query_provider() {
    let service = service(|d| {
        d.add_action(
            "/search/",
            action_fn(|ctx| {
                let query = ctx.get_as::<QueryParams>(keys::QUERY)?;
                let tags = query.get_all("tag").collect::<Vec<_>>().join(",");
                ctx.get_as::<ResponseWriter>(keys::RESPONSE)?.html(
                    StatusCode::OK,
                    format!("{} [{}]", query.get("q").unwrap_or(""), tags),
                );
                Ok(())
            }),
        )
        .unwrap();
    });

    let response = service
        .handle(request(Method::GET, "/search/?q=rust+lang&tag=a&tag=b"), None)
        .await;
    assert_eq!(body_text(response).await, "rust lang [a,b]");
}

#[tokio::test]
async fn test_request_scope_is_shared_within_a_request_only() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let service = service(|d| {
        d.context()
            .register_provider("visit", Scope::Request, move |_| {
                Ok(counter.fetch_add(1, Ordering::SeqCst))
            })
            .unwrap();
        d.add_action(
            "/",
            action_fn(|ctx| {
                let first = ctx.get_as::<usize>("visit")?;
                let second = ctx.get_as::<usize>("visit")?;
                assert!(Arc::ptr_eq(&first, &second));
                ctx.get_as::<ResponseWriter>(keys::RESPONSE)?
                    .html(StatusCode::OK, first.to_string());
                Ok(())
            }),
        )
        .unwrap();
    });

    let first = body_text(service.handle(request(Method::GET, "/"), None).await).await;
    let second = body_text(service.handle(request(Method::GET, "/"), None).await).await;
    assert_eq!(first, "0");
    assert_eq!(second, "1");
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_registry_is_sealed_after_start() {
    let service = service(|_| {});
    let err = service
        .context()
        .register_provider("late", Scope::Default, |_| Ok(1u8))
        .unwrap_err();
    assert!(matches!(err, mne::Error::RegistrySealed(_)));
}

#[tokio::test]
async fn test_failed_action_skips_after_callbacks() {
    let log: Log = Arc::default();
    let service = service(|d| {
        d.add_interceptor(tracer(&log, "outer"));
        d.add_action(
            "/",
            action_fn(|_| Err(mne::HttpError::internal("boom"))),
        )
        .unwrap();
    });

    let response = service.handle(request(Method::GET, "/"), None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_text(response).await.contains("boom"));
    assert_eq!(*log.lock().unwrap(), vec!["before outer"]);
}

#[tokio::test]
async fn test_failed_interceptor_skips_after_callbacks() {
    let log: Log = Arc::default();
    let service = service(|d| {
        d.add_interceptor(tracer(&log, "outer"));
        d.add_interceptor(interceptor_fn(|_, _| {
            Err(mne::HttpError::bad_request("rejected"))
        }));
        d.add_action("/", SimpleAction::new(StatusCode::OK, "")).unwrap();
    });

    let response = service.handle(request(Method::GET, "/"), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(*log.lock().unwrap(), vec!["before outer"]);
}

#[tokio::test]
async fn test_action_that_never_responds_is_500() {
    let service = service(|d| {
        d.add_action("/", action_fn(|_| Ok(()))).unwrap();
    });

    let response = tokio::time::timeout(
        Duration::from_secs(2),
        service.handle(request(Method::GET, "/"), None),
    )
    .await
    .expect("request hung");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_encoded_slash_stays_in_its_segment() {
    let service = service(|d| {
        for pattern in ["/files/:name/", "/files/:name/:part/"] {
            d.add_action(
                pattern,
                action_fn(move |ctx| {
                    let matches = ctx.get_as::<Matches>(keys::MATCHES)?;
                    let params = matches
                        .iter()
                        .map(|(k, v)| format!("{}={}", k, v))
                        .collect::<Vec<_>>()
                        .join(",");
                    ctx.get_as::<ResponseWriter>(keys::RESPONSE)?
                        .html(StatusCode::OK, params);
                    Ok(())
                }),
            )
            .unwrap();
        }
    });

    let response = service
        .handle(request(Method::GET, "/files/a%2Fb/"), None)
        .await;
    assert_eq!(body_text(response).await, "name=a/b");

    let response = service.handle(request(Method::GET, "/files/a/b/"), None).await;
    assert_eq!(body_text(response).await, "name=a,part=b");
}
