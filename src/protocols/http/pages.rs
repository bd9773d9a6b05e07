//! HTML pages served by the HTTP protocol.

use crate::protocols::timestamp;

/// Marker present in the body of the not found page.
pub const NOT_FOUND_MARKER: &str = "404 - Страница не найдена";

/// Wrap page content in the shared HTML document.
pub fn envelope(content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Простой HTTP Сервер</title>
    <meta charset="utf-8">
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; }}
        a {{ color: #0066cc; text-decoration: none; }}
        a:hover {{ text-decoration: underline; }}
    </style>
</head>
<body>
{content}
</body>
</html>
"#
    )
}

pub fn menu() -> String {
    envelope(
        r#"<h1>Меню</h1>
<p>Доступные страницы:</p>
<ul>
    <li><a href="/time">Текущее время</a></li>
    <li><a href="/hello">Приветствие</a></li>
    <li><a href="/echo">Эхо-тест</a></li>
</ul>"#,
    )
}

pub fn time() -> String {
    envelope(&format!(
        r#"<h1>Текущее время</h1>
<p>Серверное время: {}</p>
<a href="/">На главную</a>"#,
        timestamp()
    ))
}

pub fn hello() -> String {
    envelope(
        r#"<h1>Приветствие</h1>
<p>Привет от простого HTTP сервера на Rust!</p>
<a href="/">На главную</a>"#,
    )
}

pub fn echo() -> String {
    envelope(
        r#"<h1>Эхо-тест</h1>
<p>Это тестовая страница для проверки эхо-функциональности</p>
<a href="/">На главную</a>"#,
    )
}

pub fn not_found() -> String {
    envelope(&format!(
        r#"<h1>{NOT_FOUND_MARKER}</h1>
<p>Запрошенная страница не существует.</p>
<a href="/">На главную</a>"#
    ))
}

/// Page describing a failure while building a response. The message is
/// escaped before it is embedded.
pub fn server_error(message: &str) -> String {
    envelope(&format!(
        "<h1>Ошибка сервера</h1><p>{}</p>",
        html_escape::encode_text(message)
    ))
}
