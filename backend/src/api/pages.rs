//! Plain HTML forms for the browser flow.

use axum::response::{Html, Redirect};

const REGISTER_PAGE: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Register</title></head>
<body>
  <h1>Register</h1>
  <form method="post" action="/register">
    <label>Username <input name="username" required></label>
    <label>Password <input name="password" type="password" required></label>
    <label>Role
      <select name="role">
        <option value="user" selected>User</option>
        <option value="admin">Admin</option>
      </select>
    </label>
    <button type="submit">Register</button>
  </form>
  <p><a href="/login">Already registered? Log in</a></p>
</body>
</html>
"#;

const LOGIN_PAGE: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Login</title></head>
<body>
  <h1>Login</h1>
  <form method="post" action="/login">
    <label>Username <input name="username" required></label>
    <label>Password <input name="password" type="password" required></label>
    <button type="submit">Log in</button>
  </form>
  <p><a href="/register">Create an account</a></p>
</body>
</html>
"#;

/// Browser dashboard. Reads and writes the roster through the JSON endpoints.
pub(super) const DASHBOARD_PAGE: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Dashboard</title></head>
<body>
  <h1>Student Records</h1>
  <p id="who"></p>
  <p id="notice" role="status"></p>

  <h2>Add student</h2>
  <form id="add-form" method="post" action="/dashboard">
    <label>Student ID <input name="student_id" required></label>
    <label>Name <input name="name" required></label>
    <label>Age <input name="age" type="number" min="1" required></label>
    <button type="submit">Add</button>
  </form>

  <h2>Upload Excel</h2>
  <form id="upload-form" method="post" action="/upload" enctype="multipart/form-data">
    <input name="file" type="file" accept=".xlsx,.xls" required>
    <button type="submit">Upload</button>
  </form>

  <h2>Roster</h2>
  <table>
    <thead><tr><th>Student ID</th><th>Name</th><th>Age</th><th></th></tr></thead>
    <tbody id="roster"></tbody>
  </table>

  <p><a href="/mirror">Download Excel mirror</a> | <a href="/logout">Log out</a></p>

<script>
let isAdmin = false;

function notify(text) {
  document.getElementById("notice").textContent = text;
}

async function call(url, options) {
  const resp = await fetch(url, Object.assign({ headers: { Accept: "application/json" } }, options));
  if (resp.redirected || resp.url.endsWith("/login")) {
    window.location = "/login";
    return null;
  }
  const body = await resp.json();
  if (!body.success) {
    notify(body.error.message);
    return null;
  }
  return body.data;
}

function render(view) {
  isAdmin = view.role === "admin";
  document.getElementById("who").textContent = "Signed in as " + view.username + " (" + view.role + ")";
  if (view.mirrorStale) {
    notify("The Excel mirror is out of date and will be rebuilt.");
  }
  const tbody = document.getElementById("roster");
  tbody.replaceChildren();
  for (const student of view.students) {
    const row = tbody.insertRow();
    for (const value of [student.studentId, student.name, student.age]) {
      row.insertCell().textContent = value;
    }
    const actions = row.insertCell();
    if (isAdmin) {
      const button = document.createElement("button");
      button.textContent = "Delete";
      button.dataset.deletes = student.id;
      button.addEventListener("click", () => remove(student.id));
      actions.appendChild(button);
    }
  }
}

async function refresh() {
  const view = await call("/dashboard", {});
  if (view) render(view);
}

async function remove(id) {
  if (await call("/delete/" + id, { method: "POST" })) {
    notify("Student deleted.");
    await refresh();
  }
}

document.getElementById("add-form").addEventListener("submit", async (event) => {
  event.preventDefault();
  const form = event.target;
  const view = await call("/dashboard", { method: "POST", body: new URLSearchParams(new FormData(form)) });
  if (view) {
    form.reset();
    notify("Student added.");
    render(view);
  }
});

document.getElementById("upload-form").addEventListener("submit", async (event) => {
  event.preventDefault();
  const form = event.target;
  const summary = await call("/upload", { method: "POST", body: new FormData(form) });
  if (summary) {
    form.reset();
    notify("Imported " + summary.imported + " students.");
    await refresh();
  }
});

refresh();
</script>
</body>
</html>
"#;

/// GET / - Send visitors to the login form.
pub async fn home() -> Redirect {
    Redirect::to("/login")
}

/// GET /register - Registration form.
pub async fn register_page() -> Html<&'static str> {
    Html(REGISTER_PAGE)
}

/// GET /login - Login form.
pub async fn login_page() -> Html<&'static str> {
    Html(LOGIN_PAGE)
}
