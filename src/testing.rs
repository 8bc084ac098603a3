use axum::Router;

/// Serves `app` on an ephemeral local port and returns a source-shaped url pointing at it.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/connect2/?type=bar&key=test-key&loc_status=false")
}

/// Four widgets: two registered gyms, one unknown facility and one with a broken count.
pub const OCCUPANCY_PAGE: &str = r#"<!DOCTYPE html>
<html>
<body>
<div class="barChart">
Helen Newman Fitness Center<br />
Last Count: 31<br />
Updated: 10/17/2024 08:53 PM<br />
<div class="barChart__row"><span class="barChart__value">41%</span></div>
</div>
<div class="barChart">
Noyes Fitness Center<br />
Last Count: NA<br />
Updated: <br />
</div>
<div class="barChart">
Appel Climbing Wall<br />
Last Count: 4<br />
Updated: 10/17/2024 08:40 PM<br />
<div class="barChart__row"><span class="barChart__value">NA</span></div>
</div>
<div class="barChart">
Teagle Up Fitness Center<br />
Last Count: ??<br />
Updated: 10/17/2024 08:41 PM<br />
</div>
</body>
</html>
"#;
