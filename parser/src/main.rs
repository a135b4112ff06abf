// use parser::lexer::TokenKind;

use parser::lexer::{Token, Tokenizer};

fn main() {
    let yaml = r#"
key: value
- item
"#;
    let mut tokenizer = Tokenizer::new(yaml);
    loop {
        let token = tokenizer.next_token().expect("lex error");
        println!("{:?}", token);
        if matches!(token, Token::Eof) {
            break;
        }
    }
}
